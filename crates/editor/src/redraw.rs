//! Repaint scheduling.
//!
//! Repaint requests are fire-and-forget and coalesce: the repaint mailbox
//! holds at most one outstanding notification, so a burst of edits costs a
//! single paint. The actor snapshots under the coarse lock, folds queued
//! warnings in first, then hands the model to the [`Display`].

use scriv_worker::{Mailbox, MailboxPolicy, MailboxSender, TaskClass};

use crate::state::{EditorState, Rect, Shared};
use crate::warn::Warn;

/// The rendering surface. The terminal front end implements this; tests
/// substitute a recording double.
pub trait Display: Send + Sync + 'static {
	/// Current outer geometry.
	fn geometry(&self) -> Rect;
	/// Paints the model. Called with the coarse lock held.
	fn flush(&self, state: &EditorState);
}

/// Cheap cloneable handle for requesting a repaint.
#[derive(Clone)]
pub struct RedrawHandle {
	tx: MailboxSender<()>,
}

impl RedrawHandle {
	pub fn new(tx: MailboxSender<()>) -> Self {
		Self { tx }
	}

	/// Requests a repaint. Coalesces with any request already queued; a
	/// closed mailbox (shutdown) is ignored.
	pub async fn request(&self) {
		let _ = self.tx.try_send(()).await;
	}
}

/// Spawns the repaint actor and returns its request handle with the warning
/// queue that feeds it.
pub fn spawn(shared: Shared, display: std::sync::Arc<dyn Display>) -> (RedrawHandle, Warn) {
	let mailbox = Mailbox::new(1, MailboxPolicy::LatestWins);
	let handle = RedrawHandle::new(mailbox.sender());
	let warn = Warn::new(handle.clone());

	let rx = mailbox.receiver();
	let warn_for_actor = warn.clone();
	scriv_worker::spawn(TaskClass::Interactive, async move {
		while rx.recv().await.is_some() {
			let mut state = shared.lock();
			warn_for_actor.flush_into(&mut state);
			display.flush(&state);
			for col in &mut state.columns {
				for w in &mut col.windows {
					w.dirty = false;
				}
			}
		}
		tracing::debug!("redraw.actor.exit");
	});

	(handle, warn)
}
