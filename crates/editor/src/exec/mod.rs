//! External command execution.
//!
//! Spawning puts a child in its own process group, pumps its stderr into the
//! wait actor's error queue, posts a registration message, and arranges for
//! the eventual exit to land on the wait actor's exit queue. All bookkeeping
//! for live commands lives with [`wait`]; nothing here touches the registry
//! directly.

pub mod wait;

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use scriv_worker::{MailboxSender, TaskClass};

use crate::state::TextId;

pub use wait::{CommandRegistry, spawn_wait_actor};

/// Exit messages starting with this prefix come from internal helper
/// processes and are dropped instead of recorded as orphan exits.
pub const HELPER_EXIT_PREFIX: &str = "worker-helper";

/// Bookkeeping record for one spawned external process.
#[derive(Debug)]
pub struct Command {
	pub pid: u32,
	/// Invoking name as the user typed it.
	pub name: String,
	/// Full argument text of the invocation.
	pub text: String,
	/// Text whose output the command feeds, when any.
	pub owner: Option<TextId>,
	pub is_edit: bool,
}

/// Exit observed before the matching [`Command`] was registered.
#[derive(Debug)]
pub struct OrphanExitRecord {
	pub pid: u32,
	pub msg: String,
}

/// Asynchronous exit notification.
#[derive(Debug)]
pub struct ExitEvent {
	pub pid: u32,
	/// Empty for a clean exit.
	pub msg: String,
}

/// Signal delivered to a command's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
	/// Interactive kill request.
	Term,
	/// Shutdown: unblock everything still running.
	Hangup,
}

/// Request on the wait actor's kill queue.
#[derive(Debug)]
pub enum KillRequest {
	/// Terminate every live command whose invocation name starts with this.
	Name(String),
	/// Hang up every live command's process group.
	AllHangup,
}

/// Sender sides of the wait actor's four queues.
#[derive(Clone)]
pub struct ExecQueues {
	pub errors: MailboxSender<String>,
	pub kill: MailboxSender<KillRequest>,
	pub exits: MailboxSender<ExitEvent>,
	pub register: MailboxSender<Command>,
}

/// Delivery of group signals, substituted in tests.
pub trait ProcessSignals: Send + Sync + 'static {
	fn signal_group(&self, pid: u32, sig: KillSignal) -> io::Result<()>;
}

/// Real signal delivery via `killpg`.
pub struct OsSignals;

impl ProcessSignals for OsSignals {
	fn signal_group(&self, pid: u32, sig: KillSignal) -> io::Result<()> {
		let sig = match sig {
			KillSignal::Term => nix::sys::signal::Signal::SIGTERM,
			KillSignal::Hangup => nix::sys::signal::Signal::SIGHUP,
		};
		nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid as i32), sig).map_err(io::Error::from)
	}
}

/// What to run and where its output goes.
#[derive(Debug)]
pub struct SpawnSpec {
	pub argv: Vec<String>,
	pub dir: Option<PathBuf>,
	pub stdin: Stdio,
	pub stdout: Stdio,
	pub owner: Option<TextId>,
	pub is_edit: bool,
}

#[derive(Debug, Error)]
pub enum SpawnError {
	#[error("empty command")]
	Empty,
	#[error("spawn {name}: {source}")]
	Io {
		name: String,
		#[source]
		source: io::Error,
	},
	#[error("command queues closed")]
	Closed,
}

/// Spawns `spec` and wires it into the wait actor.
///
/// The child gets its own process group so a later kill can signal the whole
/// pipeline. Its stderr is pumped line by line onto the error queue; the exit
/// is reported on the exit queue after registration has been posted, though
/// a fast child may still be observed exiting first. Returns the pid.
pub async fn spawn_command(queues: &ExecQueues, spec: SpawnSpec) -> Result<u32, SpawnError> {
	let Some(name) = spec.argv.first().cloned() else {
		return Err(SpawnError::Empty);
	};
	let text = spec.argv.join(" ");

	let mut cmd = tokio::process::Command::new(&name);
	cmd.args(&spec.argv[1..])
		.stdin(spec.stdin)
		.stdout(spec.stdout)
		.stderr(Stdio::piped())
		.process_group(0);
	if let Some(dir) = &spec.dir {
		cmd.current_dir(dir);
	}

	let mut child = cmd.spawn().map_err(|source| SpawnError::Io {
		name: name.clone(),
		source,
	})?;
	let pid = child.id().ok_or_else(|| SpawnError::Io {
		name: name.clone(),
		source: io::Error::other("child exited before its pid was observed"),
	})?;
	tracing::debug!(pid, name = name.as_str(), "exec.spawn");

	if let Some(stderr) = child.stderr.take() {
		let errors = queues.errors.clone();
		let err_name = name.clone();
		scriv_worker::spawn(TaskClass::IoBlocking, async move {
			let mut lines = BufReader::new(stderr).lines();
			while let Ok(Some(line)) = lines.next_line().await {
				if errors.send(format!("{err_name}: {line}")).await.is_err() {
					break;
				}
			}
		});
	}

	queues
		.register
		.send(Command {
			pid,
			name,
			text,
			owner: spec.owner,
			is_edit: spec.is_edit,
		})
		.await
		.map_err(|_| SpawnError::Closed)?;

	let exits = queues.exits.clone();
	scriv_worker::spawn(TaskClass::IoBlocking, async move {
		let msg = match child.wait().await {
			Ok(status) if status.success() => String::new(),
			Ok(status) => match (status.code(), status.signal()) {
				(Some(code), _) => format!("exit status {code}"),
				(None, Some(sig)) => format!("signal {sig}"),
				(None, None) => "exited abnormally".to_string(),
			},
			Err(err) => format!("wait failed: {err}"),
		};
		let _ = exits.send(ExitEvent { pid, msg }).await;
	});

	Ok(pid)
}
