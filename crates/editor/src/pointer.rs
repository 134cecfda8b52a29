//! The pointer actor.
//!
//! Multiplexes pointer events, display resizes, repaint requests delegated
//! by the import actor, and warning wakeups. Queued warnings are folded into
//! the command line before each dispatch. Crossing from one text to another
//! commits the pending edit on the text being left. A button press lands in
//! one of three zones: the scroll gutter scrolls, the drag handle raises the
//! window, and content takes exactly one selection gesture per press.

use std::process::Stdio;
use std::sync::Arc;

use scriv_worker::{Mailbox, MailboxPolicy, MailboxSender, TaskClass};

use crate::exec::{self, ExecQueues, KillRequest, SpawnSpec};
use crate::redraw::{Display, RedrawHandle};
use crate::sel::Exporter;
use crate::state::{Point, Shared, TextId, TextKind, Zone};
use crate::warn::Warn;

/// Primary button: select.
pub const B1: u8 = 1;
/// Secondary button: execute the indicated text as a command.
pub const B2: u8 = 2;
/// Tertiary button: execute the indicated word with the selection as its
/// implicit argument.
pub const B3: u8 = 4;

const QUEUE_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
	pub pos: Point,
	pub buttons: u8,
}

/// Sender sides of the pointer actor's queues.
#[derive(Clone)]
pub struct PointerQueues {
	pub pointer: MailboxSender<PointerEvent>,
	pub resize: MailboxSender<()>,
	/// Repaint requests delegated by the import actor.
	pub sel_repaint: MailboxSender<()>,
}

enum Action {
	Spawn { argv: Vec<String>, owner: Option<TextId> },
	Kill(String),
	Export { text: TextId, context: String, bytes: Vec<u8> },
}

struct PointerActor {
	shared: Shared,
	display: Arc<dyn Display>,
	warn: Warn,
	redraw: RedrawHandle,
	exec: ExecQueues,
	exporter: Exporter,
	prev_buttons: u8,
	/// Anchor of an in-progress primary drag.
	drag: Option<(TextId, usize)>,
}

/// Spawns the pointer actor and returns its queues.
pub fn spawn_pointer_actor(
	shared: Shared,
	display: Arc<dyn Display>,
	warn: Warn,
	redraw: RedrawHandle,
	exec: ExecQueues,
	exporter: Exporter,
) -> PointerQueues {
	let pointer = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let resize = Mailbox::new(1, MailboxPolicy::LatestWins);
	let sel_repaint = Mailbox::new(1, MailboxPolicy::LatestWins);

	let queues = PointerQueues {
		pointer: pointer.sender(),
		resize: resize.sender(),
		sel_repaint: sel_repaint.sender(),
	};

	let (ptr_rx, resize_rx, sel_rx) = (pointer.receiver(), resize.receiver(), sel_repaint.receiver());
	let warn_rx = warn.wake_receiver();
	let mut actor = PointerActor {
		shared,
		display,
		warn,
		redraw,
		exec,
		exporter,
		prev_buttons: 0,
		drag: None,
	};

	scriv_worker::spawn(TaskClass::Interactive, async move {
		loop {
			let flushed = {
				let mut state = actor.shared.lock();
				actor.warn.flush_into(&mut state)
			};
			if flushed {
				actor.redraw.request().await;
			}

			tokio::select! {
				biased;
				Some(()) = warn_rx.recv() => {
					// Flushed at the top of the next cycle.
				}
				Some(()) = resize_rx.recv() => {
					let rect = actor.display.geometry();
					actor.shared.lock().resize(rect);
					actor.redraw.request().await;
				}
				Some(()) = sel_rx.recv() => {
					actor.redraw.request().await;
				}
				Some(ev) = ptr_rx.recv() => {
					actor.on_pointer(ev).await;
				}
				else => break,
			}
		}
		tracing::debug!("pointer.actor.exit");
	});

	queues
}

impl PointerActor {
	async fn on_pointer(&mut self, ev: PointerEvent) {
		let down = ev.buttons & !self.prev_buttons;
		let released = self.prev_buttons & !ev.buttons;
		let held = ev.buttons & self.prev_buttons;
		self.prev_buttons = ev.buttons;

		let mut action = None;
		{
			let mut state = self.shared.lock();
			state.last_pointer = ev.pos;
			let hit = state.which(ev.pos);

			// Commit whatever the pointer is leaving behind.
			if let Some(prev) = state.mouse_target
				&& hit.map(|h| h.text) != Some(prev)
			{
				match state.text(prev).map(|t| (t.kind(), t.window())) {
					Some((TextKind::Tag, Some(win))) => {
						state.commit_tag(win);
					}
					Some(_) => {
						if let Some(t) = state.text_mut(prev) {
							t.commit();
						}
					}
					None => {}
				}
			}
			state.mouse_target = hit.map(|h| h.text);

			let Some(hit) = hit else {
				self.drag = None;
				return;
			};

			match hit.zone {
				Zone::ScrollGutter if down != 0 => {
					if let Some(win) = hit.window {
						self.scroll_to(&mut state, win, ev.pos);
					}
				}
				Zone::DragHandle if down != 0 => {
					if let Some(win) = hit.window {
						state.raise_window(win);
					}
				}
				Zone::Content => {
					if down & B1 != 0 {
						if let Some(at) = state.char_at(hit.text, ev.pos) {
							if let Some(t) = state.text_mut(hit.text) {
								t.set_select(at, at);
							}
							state.focus = Some(hit.text);
							self.drag = Some((hit.text, at));
						}
					} else if held & B1 != 0 {
						if let Some((anchor_text, anchor)) = self.drag
							&& anchor_text == hit.text
							&& let Some(at) = state.char_at(hit.text, ev.pos)
							&& let Some(t) = state.text_mut(hit.text)
						{
							t.set_select(anchor.min(at), anchor.max(at));
						}
					} else if down & B2 != 0 {
						action = self.execute_action(&state, hit.text, ev.pos);
					} else if down & B3 != 0 {
						action = self.execute_with_argument(&state, hit.text, ev.pos);
					}

					if released & B1 != 0
						&& let Some(t) = state.text(hit.text)
						&& t.kind() == TextKind::Body
						&& t.q0 < t.q1
					{
						let context = hit
							.window
							.and_then(|w| state.window(w))
							.map(|w| w.name.clone())
							.unwrap_or_else(|| "scriv".to_string());
						action = Some(Action::Export {
							text: hit.text,
							context,
							bytes: t.selection_str().into_bytes(),
						});
						self.drag = None;
					}
				}
				_ => {}
			}
			if ev.buttons == 0 {
				self.drag = None;
			}
			if let Some(win) = hit.window {
				let body = state.window(win).map(|w| w.body.id());
				if let Some(body) = body {
					state.mark_dirty(body);
				}
			}
		}

		match action {
			Some(Action::Spawn { argv, owner }) => {
				let spec = SpawnSpec {
					argv,
					dir: None,
					stdin: Stdio::null(),
					stdout: Stdio::null(),
					owner,
					is_edit: false,
				};
				if let Err(err) = exec::spawn_command(&self.exec, spec).await {
					self.warn.post(err.to_string()).await;
				}
			}
			Some(Action::Kill(name)) => {
				let _ = self.exec.kill.send(KillRequest::Name(name)).await;
			}
			Some(Action::Export { text, context, bytes }) => {
				self.exporter.export(text, context, bytes).await;
			}
			None => {}
		}
		self.redraw.request().await;
	}

	/// Jumps the window's view so the clicked gutter fraction becomes the
	/// top line.
	fn scroll_to(&self, state: &mut crate::state::EditorState, win: crate::state::WindowId, pos: Point) {
		use crate::state::LINE_H;
		let body = match state.window(win) {
			Some(w) => {
				let body_y = w.rect.y + LINE_H;
				let body_h = (w.rect.h - LINE_H).max(1);
				let frac = f64::from((pos.y - body_y).clamp(0, body_h)) / f64::from(body_h);
				let lines = w.body.content().lines().count();
				let top = (frac * lines as f64) as usize;
				w.render.lock().top_line = top.min(lines.saturating_sub(1));
				w.body.id()
			}
			None => return,
		};
		state.mark_dirty(body);
	}

	/// Secondary gesture: the selection if the click lands inside it,
	/// otherwise the word under the click, executed as a command. `Kill`
	/// followed by a name is routed to the wait actor instead of spawned.
	fn execute_action(&self, state: &crate::state::EditorState, text: TextId, pos: Point) -> Option<Action> {
		let at = state.char_at(text, pos)?;
		let t = state.text(text)?;
		let (q0, q1) = t.selection();
		let cmd = if q0 < q1 && at >= q0 && at <= q1 {
			t.selection_str()
		} else {
			let (w0, w1) = t.word_at(at);
			let content = t.content();
			content.chars().skip(w0).take(w1 - w0).collect()
		};
		let cmd = cmd.trim();
		if cmd.is_empty() {
			return None;
		}
		if let Some(rest) = cmd.strip_prefix("Kill ") {
			let name = rest.trim();
			if !name.is_empty() {
				return Some(Action::Kill(name.to_string()));
			}
			return None;
		}
		Some(Action::Spawn {
			argv: cmd.split_whitespace().map(str::to_string).collect(),
			owner: self.body_of(state, text),
		})
	}

	/// Tertiary gesture: the word under the click, with the current
	/// selection of the same text appended as its argument.
	fn execute_with_argument(&self, state: &crate::state::EditorState, text: TextId, pos: Point) -> Option<Action> {
		let at = state.char_at(text, pos)?;
		let t = state.text(text)?;
		let (w0, w1) = t.word_at(at);
		let word: String = t.content().chars().skip(w0).take(w1 - w0).collect();
		if word.is_empty() {
			return None;
		}
		let mut argv = vec![word];
		let arg = t.selection_str();
		if !arg.is_empty() {
			argv.push(arg);
		}
		Some(Action::Spawn {
			argv,
			owner: self.body_of(state, text),
		})
	}

	fn body_of(&self, state: &crate::state::EditorState, text: TextId) -> Option<TextId> {
		state
			.text(text)
			.and_then(|t| t.window())
			.and_then(|w| state.window(w))
			.map(|w| w.body.id())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use parking_lot::Mutex as PlMutex;

	use super::*;
	use crate::sel::mem::MemSelectionService;
	use crate::sel::{ExportState, SelectionChange};
	use crate::state::{CELL_W, EditorState, GUTTER_W, LINE_H, Rect, WindowId};

	struct StubDisplay {
		rect: PlMutex<Rect>,
	}

	impl Display for StubDisplay {
		fn geometry(&self) -> Rect {
			*self.rect.lock()
		}

		fn flush(&self, _state: &EditorState) {}
	}

	struct Rig {
		shared: Shared,
		queues: PointerQueues,
		win: WindowId,
		service: Arc<MemSelectionService>,
		kill_rx: scriv_worker::MailboxReceiver<KillRequest>,
		register_rx: scriv_worker::MailboxReceiver<crate::exec::Command>,
		display: Arc<StubDisplay>,
	}

	fn rig() -> Rig {
		let mut state = EditorState::new(
			Rect {
				x: 0,
				y: 0,
				w: 800,
				h: 600,
			},
			1,
		);
		let win = state.new_window(0, "scratch");
		let shared = state.into_shared();

		let redraw = RedrawHandle::new(Mailbox::new(1, MailboxPolicy::LatestWins).sender());
		let warn = Warn::new(redraw.clone());

		let errors = Mailbox::new(16, MailboxPolicy::Backpressure);
		let kill = Mailbox::new(16, MailboxPolicy::Backpressure);
		let exits = Mailbox::new(16, MailboxPolicy::Backpressure);
		let register = Mailbox::new(16, MailboxPolicy::Backpressure);
		let exec = ExecQueues {
			errors: errors.sender(),
			kill: kill.sender(),
			exits: exits.sender(),
			register: register.sender(),
		};

		let service = Arc::new(MemSelectionService::new());
		let changes = Mailbox::<SelectionChange>::new(16, MailboxPolicy::Backpressure);
		let export_state = Arc::new(PlMutex::new(ExportState::default()));
		let exporter = Exporter::new(service.clone(), export_state, changes.sender(), warn.clone());

		let display = Arc::new(StubDisplay {
			rect: PlMutex::new(Rect {
				x: 0,
				y: 0,
				w: 800,
				h: 600,
			}),
		});
		let queues = spawn_pointer_actor(
			Arc::clone(&shared),
			display.clone(),
			warn,
			redraw,
			exec,
			exporter,
		);
		Rig {
			shared,
			queues,
			win,
			service,
			kill_rx: kill.receiver(),
			register_rx: register.receiver(),
			display,
		}
	}

	impl Rig {
		/// Screen position of char `col` on body line `line`.
		fn body_pos(&self, line: usize, col: usize) -> Point {
			let rect = self.shared.lock().window(self.win).unwrap().rect;
			Point {
				x: rect.x + GUTTER_W + col as i32 * CELL_W,
				y: rect.y + LINE_H + line as i32 * LINE_H + 1,
			}
		}

		async fn send(&self, pos: Point, buttons: u8) {
			self.queues.pointer.send(PointerEvent { pos, buttons }).await.unwrap();
		}

		fn set_body(&self, content: &str) {
			let mut state = self.shared.lock();
			let body = state.window(self.win).unwrap().body.id();
			let t = state.text_mut(body).unwrap();
			t.insert(0, content);
			t.set_select(0, 0);
		}
	}

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(40)).await;
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn primary_click_sets_caret_and_focus() {
		let rig = rig();
		rig.set_body("hello world");
		let pos = rig.body_pos(0, 6);
		rig.send(pos, B1).await;
		rig.send(pos, 0).await;
		settle().await;

		let state = rig.shared.lock();
		let body = state.window(rig.win).unwrap().body.id();
		assert_eq!(state.text(body).unwrap().selection(), (6, 6));
		assert_eq!(state.focus, Some(body));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn primary_drag_extends_and_release_exports() {
		let rig = rig();
		rig.set_body("hello world");
		rig.send(rig.body_pos(0, 6), B1).await;
		rig.send(rig.body_pos(0, 11), B1).await;
		rig.send(rig.body_pos(0, 11), 0).await;

		rig.service.wait_published().await;
		assert_eq!(rig.service.stored_text().await, b"world");
		let state = rig.shared.lock();
		let body = state.window(rig.win).unwrap().body.id();
		assert_eq!(state.text(body).unwrap().selection(), (6, 11));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn secondary_click_on_kill_selection_posts_kill_request() {
		let rig = rig();
		rig.set_body("Kill make");
		{
			let mut state = rig.shared.lock();
			let body = state.window(rig.win).unwrap().body.id();
			state.text_mut(body).unwrap().set_select(0, 9);
		}
		rig.send(rig.body_pos(0, 4), B2).await;
		rig.send(rig.body_pos(0, 4), 0).await;
		settle().await;

		match rig.kill_rx.try_recv().await {
			Some(KillRequest::Name(name)) => assert_eq!(name, "make"),
			other => panic!("expected a kill request, got {other:?}"),
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn secondary_click_on_word_spawns_it() {
		let rig = rig();
		rig.set_body("run true now");
		rig.send(rig.body_pos(0, 5), B2).await;
		rig.send(rig.body_pos(0, 5), 0).await;
		settle().await;

		let cmd = rig.register_rx.try_recv().await.expect("command registered");
		assert_eq!(cmd.name, "true");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn resize_requeries_geometry_and_relayouts() {
		let rig = rig();
		*rig.display.rect.lock() = Rect {
			x: 0,
			y: 0,
			w: 400,
			h: 300,
		};
		rig.queues.resize.send(()).await.unwrap();
		settle().await;

		let state = rig.shared.lock();
		assert_eq!(state.rect.w, 400);
		assert_eq!(state.window(rig.win).unwrap().rect.w, 400);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn leaving_a_tag_commits_its_pending_edit() {
		let rig = rig();
		{
			let mut state = rig.shared.lock();
			let tag = state.window(rig.win).unwrap().tag.id();
			let len = state.window(rig.win).unwrap().tag.len();
			let t = state.text_mut(tag).unwrap();
			t.delete(0, len);
			t.insert(0, "renamed ");
			state.mouse_target = Some(tag);
		}
		// Move onto the body; the tag edit commits on the way out.
		rig.send(rig.body_pos(0, 0), 0).await;
		settle().await;
		assert_eq!(rig.shared.lock().window(rig.win).unwrap().name, "renamed");
	}
}
