//! The process wait actor.
//!
//! Owns the live command list and the orphan-exit side list. There is a race
//! between a child exiting and the editor finding out it was ever created:
//! the exit notification and the registration message travel on different
//! queues, so either may arrive first. An exit with no matching command is
//! parked as an [`OrphanExitRecord`]; a registration finding such a record
//! reports the exit immediately and never inserts the command. Either way
//! exactly one teardown happens per pid.

use std::sync::Arc;

use scriv_worker::{Mailbox, MailboxPolicy, MailboxSender, TaskClass};

use super::{Command, ExecQueues, ExitEvent, HELPER_EXIT_PREFIX, KillRequest, KillSignal, OrphanExitRecord, ProcessSignals};
use crate::redraw::RedrawHandle;
use crate::state::Shared;
use crate::warn::Warn;

const QUEUE_DEPTH: usize = 64;

/// Live commands plus orphan exits, owned exclusively by the wait actor.
#[derive(Debug, Default)]
pub struct CommandRegistry {
	/// Most recently registered first.
	commands: Vec<Command>,
	orphans: Vec<OrphanExitRecord>,
}

impl CommandRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts at the head of the live list.
	pub fn push_front(&mut self, cmd: Command) {
		self.commands.insert(0, cmd);
	}

	/// Removes and returns the command for `pid`.
	pub fn unlink(&mut self, pid: u32) -> Option<Command> {
		let at = self.commands.iter().position(|c| c.pid == pid)?;
		Some(self.commands.remove(at))
	}

	/// Parks an exit that beat its registration. At most one record per pid.
	pub fn record_orphan(&mut self, pid: u32, msg: String) {
		if self.orphans.iter().any(|o| o.pid == pid) {
			return;
		}
		self.orphans.push(OrphanExitRecord { pid, msg });
	}

	/// Consumes the orphan record for `pid`, if one exists.
	pub fn take_orphan(&mut self, pid: u32) -> Option<OrphanExitRecord> {
		let at = self.orphans.iter().position(|o| o.pid == pid)?;
		Some(self.orphans.remove(at))
	}

	/// Live commands whose invocation name starts with `prefix`.
	pub fn matches(&self, prefix: &str) -> Vec<(u32, String)> {
		self.commands
			.iter()
			.filter(|c| c.name.starts_with(prefix))
			.map(|c| (c.pid, c.name.clone()))
			.collect()
	}

	pub fn live_pids(&self) -> Vec<u32> {
		self.commands.iter().map(|c| c.pid).collect()
	}

	pub fn commands(&self) -> &[Command] {
		&self.commands
	}

	pub fn orphan_count(&self) -> usize {
		self.orphans.len()
	}
}

struct WaitActor {
	shared: Shared,
	warn: Warn,
	redraw: RedrawHandle,
	signals: Arc<dyn ProcessSignals>,
	edit_done: Option<MailboxSender<()>>,
	registry: CommandRegistry,
}

/// Spawns the wait actor and returns the sender sides of its four queues.
pub fn spawn_wait_actor(
	shared: Shared,
	warn: Warn,
	redraw: RedrawHandle,
	signals: Arc<dyn ProcessSignals>,
	edit_done: Option<MailboxSender<()>>,
) -> ExecQueues {
	let errors = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let kill = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let exits = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let register = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);

	let queues = ExecQueues {
		errors: errors.sender(),
		kill: kill.sender(),
		exits: exits.sender(),
		register: register.sender(),
	};

	let mut actor = WaitActor {
		shared,
		warn,
		redraw,
		signals,
		edit_done,
		registry: CommandRegistry::new(),
	};

	let (err_rx, kill_rx, exit_rx, reg_rx) = (errors.receiver(), kill.receiver(), exits.receiver(), register.receiver());
	scriv_worker::spawn(TaskClass::Background, async move {
		loop {
			tokio::select! {
				biased;
				Some(err) = err_rx.recv() => actor.on_error(err).await,
				Some(req) = kill_rx.recv() => actor.on_kill(req).await,
				Some(exit) = exit_rx.recv() => actor.on_exit(exit).await,
				Some(cmd) = reg_rx.recv() => actor.on_register(cmd).await,
				else => break,
			}
		}
		tracing::debug!("wait.actor.exit");
	});

	queues
}

impl WaitActor {
	async fn on_error(&mut self, err: String) {
		self.warn.post(err).await;
	}

	async fn on_kill(&mut self, req: KillRequest) {
		match req {
			KillRequest::Name(prefix) => {
				let matches = self.registry.matches(&prefix);
				let found = !matches.is_empty();
				for (pid, name) in matches {
					tracing::debug!(pid, name = name.as_str(), "wait.kill");
					if let Err(err) = self.signals.signal_group(pid, KillSignal::Term) {
						self.warn.post(format!("kill {name}: {err}")).await;
					}
				}
				if !found {
					self.warn.post(format!("Kill: no process {prefix}")).await;
				}
			}
			KillRequest::AllHangup => {
				for pid in self.registry.live_pids() {
					let _ = self.signals.signal_group(pid, KillSignal::Hangup);
				}
			}
		}
	}

	async fn on_exit(&mut self, exit: ExitEvent) {
		let cmd = self.registry.unlink(exit.pid);
		let warn_msg = {
			let mut state = self.shared.lock();
			state.tag.commit();
			match &cmd {
				None => {
					if !exit.msg.starts_with(HELPER_EXIT_PREFIX) {
						tracing::trace!(pid = exit.pid, "wait.orphan_exit");
						self.registry.record_orphan(exit.pid, exit.msg);
					}
					None
				}
				Some(c) => {
					// Drop the echoed invocation from the command line.
					if state.tag.search(&format!("{} ", c.name)) {
						let (q0, q1) = state.tag.selection();
						state.tag.delete(q0, q1);
						state.tag.set_select(0, 0);
					}
					(!exit.msg.is_empty()).then(|| format!("{}: exit {}", c.name, exit.msg))
				}
			}
		};
		if let Some(msg) = warn_msg {
			self.warn.post(msg).await;
		}
		if let Some(cmd) = cmd {
			self.teardown(cmd).await;
		}
		self.redraw.request().await;
	}

	async fn on_register(&mut self, cmd: Command) {
		if let Some(orphan) = self.registry.take_orphan(cmd.pid) {
			// Already exited: report and tear down, never insert.
			if !orphan.msg.is_empty() {
				self.warn.post(orphan.msg).await;
			}
			self.teardown(cmd).await;
			self.redraw.request().await;
			return;
		}

		let echo = format!("{} ", cmd.name);
		self.registry.push_front(cmd);
		{
			let mut state = self.shared.lock();
			state.tag.commit();
			state.tag.insert(0, &echo);
			state.tag.set_select(0, 0);
		}
		self.redraw.request().await;
	}

	async fn teardown(&mut self, cmd: Command) {
		tracing::debug!(pid = cmd.pid, name = cmd.name.as_str(), "wait.teardown");
		if cmd.is_edit
			&& let Some(edit_done) = &self.edit_done
		{
			let _ = edit_done.send(()).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io;
	use std::sync::Mutex as StdMutex;
	use std::time::Duration;

	use super::*;
	use crate::state::{EditorState, Rect};

	fn cmd(pid: u32, name: &str) -> Command {
		Command {
			pid,
			name: name.to_string(),
			text: name.to_string(),
			owner: None,
			is_edit: false,
		}
	}

	#[test]
	fn registry_keeps_at_most_one_orphan_per_pid() {
		let mut reg = CommandRegistry::new();
		reg.record_orphan(7, "exit status 1".into());
		reg.record_orphan(7, "exit status 2".into());
		assert_eq!(reg.orphan_count(), 1);
		assert_eq!(reg.take_orphan(7).unwrap().msg, "exit status 1");
		assert!(reg.take_orphan(7).is_none());
	}

	#[test]
	fn registry_matches_by_name_prefix() {
		let mut reg = CommandRegistry::new();
		reg.push_front(cmd(1, "foobar"));
		reg.push_front(cmd(2, "foo"));
		reg.push_front(cmd(3, "bar"));
		let pids: Vec<u32> = reg.matches("foo").into_iter().map(|(p, _)| p).collect();
		assert_eq!(pids, vec![2, 1]);
		assert!(reg.matches("baz").is_empty());
	}

	struct RecordingSignals {
		sent: StdMutex<Vec<(u32, KillSignal)>>,
	}

	impl RecordingSignals {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				sent: StdMutex::new(Vec::new()),
			})
		}
	}

	impl ProcessSignals for RecordingSignals {
		fn signal_group(&self, pid: u32, sig: KillSignal) -> io::Result<()> {
			self.sent.lock().unwrap().push((pid, sig));
			Ok(())
		}
	}

	struct Rig {
		shared: Shared,
		queues: ExecQueues,
		signals: Arc<RecordingSignals>,
		warn: Warn,
	}

	impl Rig {
		/// Folds queued warnings into the row tag and returns its content.
		fn tag_with_warnings(&self) -> String {
			let mut state = self.shared.lock();
			self.warn.flush_into(&mut state);
			state.tag.content()
		}
	}

	fn rig() -> Rig {
		let shared = EditorState::new(
			Rect {
				x: 0,
				y: 0,
				w: 800,
				h: 600,
			},
			1,
		)
		.into_shared();
		let repaint = Mailbox::new(1, MailboxPolicy::LatestWins);
		let redraw = RedrawHandle::new(repaint.sender());
		let warn = Warn::new(redraw.clone());
		let signals = RecordingSignals::new();
		let queues = spawn_wait_actor(Arc::clone(&shared), warn.clone(), redraw, signals.clone(), None);
		Rig {
			shared,
			queues,
			signals,
			warn,
		}
	}

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(30)).await;
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn register_then_exit_echoes_and_cleans_up() {
		let rig = rig();
		rig.queues.register.send(cmd(100, "ls")).await.unwrap();
		settle().await;
		assert_eq!(rig.shared.lock().tag.content(), "ls ");

		rig.queues
			.exits
			.send(ExitEvent {
				pid: 100,
				msg: String::new(),
			})
			.await
			.unwrap();
		settle().await;
		// Echo removed on exit, clean exit produces no warning.
		assert_eq!(rig.shared.lock().tag.content(), "");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn registrations_echo_most_recent_first() {
		let rig = rig();
		for (pid, name) in [(1, "c1"), (2, "c2"), (3, "c3")] {
			rig.queues.register.send(cmd(pid, name)).await.unwrap();
		}
		settle().await;
		assert_eq!(rig.shared.lock().tag.content(), "c3 c2 c1 ");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn exit_before_registration_reports_once_and_never_inserts() {
		let rig = rig();
		rig.queues
			.exits
			.send(ExitEvent {
				pid: 100,
				msg: "exit status 1".into(),
			})
			.await
			.unwrap();
		settle().await;

		rig.queues.register.send(cmd(100, "ls")).await.unwrap();
		settle().await;

		let tag = rig.tag_with_warnings();
		// Never echoed, but the parked exit message surfaced.
		assert!(!tag.contains("ls "));
		assert!(tag.contains("exit status 1"));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn helper_exits_are_dropped_silently() {
		let rig = rig();
		rig.queues
			.exits
			.send(ExitEvent {
				pid: 555,
				msg: format!("{HELPER_EXIT_PREFIX}: done"),
			})
			.await
			.unwrap();
		settle().await;

		// A later registration for the same pid must not find an orphan.
		rig.queues.register.send(cmd(555, "helper")).await.unwrap();
		settle().await;
		assert_eq!(rig.shared.lock().tag.content(), "helper ");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn kill_signals_prefix_matches_and_warns_on_none() {
		let rig = rig();
		rig.queues.register.send(cmd(10, "make")).await.unwrap();
		rig.queues.register.send(cmd(11, "makedoc")).await.unwrap();
		rig.queues.register.send(cmd(12, "grep")).await.unwrap();
		settle().await;

		rig.queues.kill.send(KillRequest::Name("make".into())).await.unwrap();
		settle().await;
		{
			let sent = rig.signals.sent.lock().unwrap();
			let mut pids: Vec<u32> = sent.iter().map(|&(p, _)| p).collect();
			pids.sort_unstable();
			assert_eq!(pids, vec![10, 11]);
			assert!(sent.iter().all(|&(_, s)| s == KillSignal::Term));
		}
		assert!(!rig.tag_with_warnings().contains("no process"));

		rig.queues.kill.send(KillRequest::Name("vi".into())).await.unwrap();
		settle().await;
		assert!(rig.tag_with_warnings().contains("Kill: no process vi"));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn all_hangup_reaches_every_live_group() {
		let rig = rig();
		rig.queues.register.send(cmd(21, "a")).await.unwrap();
		rig.queues.register.send(cmd(22, "b")).await.unwrap();
		settle().await;

		rig.queues.kill.send(KillRequest::AllHangup).await.unwrap();
		settle().await;
		let sent = rig.signals.sent.lock().unwrap();
		let mut pids: Vec<u32> = sent
			.iter()
			.filter(|&&(_, s)| s == KillSignal::Hangup)
			.map(|&(p, _)| p)
			.collect();
		pids.sort_unstable();
		assert_eq!(pids, vec![21, 22]);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn error_queue_lines_surface_as_warnings() {
		let rig = rig();
		rig.queues.errors.send("cc: file.c:3: syntax error".into()).await.unwrap();
		settle().await;
		assert!(rig.tag_with_warnings().contains("cc: file.c:3: syntax error"));
	}
}
