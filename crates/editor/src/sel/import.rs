//! The selection import actor.
//!
//! Consumes [`SelectionChange`] messages from export watchers and applies
//! them to the text that owns the current export. The generation gate is the
//! only defense against watchers from superseded exports: a message whose
//! generation differs from the current one is dropped, whatever its content.

use std::sync::Arc;

use parking_lot::Mutex;

use scriv_worker::{MailboxReceiver, MailboxSender, TaskClass};

use super::{ExportState, SelectionChange};
use crate::state::Shared;

/// Spawns the import actor over the watchers' change queue. Repaints are
/// delegated through `repaint`, the pointer actor's selection queue.
pub fn spawn_import_actor(
	shared: Shared,
	export: Arc<Mutex<ExportState>>,
	rx: MailboxReceiver<SelectionChange>,
	repaint: MailboxSender<()>,
) {
	scriv_worker::spawn(TaskClass::Background, async move {
		while let Some(change) = rx.recv().await {
			let owner = {
				let export = export.lock();
				if change.generation != export.generation {
					tracing::trace!(
						got = change.generation,
						current = export.generation,
						"sel.import.stale"
					);
					continue;
				}
				export.owner
			};
			let Some(owner) = owner else { continue };

			{
				let mut state = shared.lock();
				let Some(text) = state.text_mut(owner) else { continue };
				let (q0, q1) = text.selection();
				if change.data.is_empty() {
					text.delete(q0, q1);
					text.set_select(q0, q0);
				} else {
					let s = String::from_utf8_lossy(&change.data).into_owned();
					text.insert(q1, &s);
					text.set_select(q0, q1 + s.chars().count());
				}
				state.mark_dirty(owner);
			}
			let _ = repaint.try_send(()).await;
		}
		tracing::debug!("sel.import.exit");
	});
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use scriv_worker::{Mailbox, MailboxPolicy};

	use super::*;
	use crate::state::{EditorState, Rect, TextId};

	struct Rig {
		shared: Shared,
		export: Arc<Mutex<ExportState>>,
		changes: MailboxSender<SelectionChange>,
		body: TextId,
	}

	fn rig(content: &str, q0: usize, q1: usize) -> Rig {
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
		let body = state.window(win).unwrap().body.id();
		{
			let t = state.text_mut(body).unwrap();
			t.insert(0, content);
			t.set_select(q0, q1);
		}
		let shared = state.into_shared();
		let export = Arc::new(Mutex::new(ExportState {
			generation: 1,
			owner: Some(body),
		}));
		let repaint = Mailbox::new(1, MailboxPolicy::LatestWins);
		let mailbox = Mailbox::new(64, MailboxPolicy::Backpressure);
		let changes = mailbox.sender();
		spawn_import_actor(Arc::clone(&shared), Arc::clone(&export), mailbox.receiver(), repaint.sender());
		Rig {
			shared,
			export,
			changes,
			body,
		}
	}

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(30)).await;
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn round_trip_reselects_the_reinserted_copy() {
		let rig = rig("hello world", 6, 11);
		rig.changes
			.send(SelectionChange {
				generation: 1,
				data: Vec::new(),
			})
			.await
			.unwrap();
		rig.changes
			.send(SelectionChange {
				generation: 1,
				data: b"world".to_vec(),
			})
			.await
			.unwrap();
		settle().await;

		let state = rig.shared.lock();
		let t = state.text(rig.body).unwrap();
		assert_eq!(t.content(), "hello world");
		assert_eq!(t.selection(), (6, 11));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn empty_payload_clears_the_selection() {
		let rig = rig("hello world", 6, 11);
		rig.changes
			.send(SelectionChange {
				generation: 1,
				data: Vec::new(),
			})
			.await
			.unwrap();
		settle().await;

		let state = rig.shared.lock();
		let t = state.text(rig.body).unwrap();
		assert_eq!(t.content(), "hello ");
		assert_eq!(t.selection(), (6, 6));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn stale_generation_is_discarded_newer_applied() {
		let rig = rig("hello world", 6, 11);
		// Two rapid exports happened; messages from the first still in
		// flight must not land.
		rig.export.lock().generation = 6;
		rig.changes
			.send(SelectionChange {
				generation: 5,
				data: b"x".to_vec(),
			})
			.await
			.unwrap();
		rig.changes
			.send(SelectionChange {
				generation: 6,
				data: b"y".to_vec(),
			})
			.await
			.unwrap();
		settle().await;

		let state = rig.shared.lock();
		let t = state.text(rig.body).unwrap();
		assert_eq!(t.content(), "hello worldy");
		assert_eq!(t.selection(), (6, 12));
	}
}
