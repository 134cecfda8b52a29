//! Out-of-band diagnostics for the user.
//!
//! Anything that fails off the main event path (a spawn that could not
//! start, a kill that matched nothing, a selection export that went wrong)
//! posts a warning here instead of touching the model directly. Warnings
//! accumulate in a small sync queue and are folded into the row-wide
//! command-line buffer the next time someone holds the coarse lock, so
//! posting never contends for it.

use std::sync::Arc;

use parking_lot::Mutex;

use scriv_worker::{Mailbox, MailboxPolicy, MailboxReceiver};

use crate::redraw::RedrawHandle;
use crate::state::EditorState;

#[derive(Clone)]
pub struct Warn {
	pending: Arc<Mutex<Vec<String>>>,
	redraw: RedrawHandle,
	/// Pings the pointer actor, which flushes before its next dispatch.
	wake: Arc<Mailbox<()>>,
}

impl Warn {
	pub fn new(redraw: RedrawHandle) -> Self {
		Self {
			pending: Arc::new(Mutex::new(Vec::new())),
			redraw,
			wake: Arc::new(Mailbox::new(1, MailboxPolicy::LatestWins)),
		}
	}

	/// Receiver for the wake ping posted with each warning.
	pub fn wake_receiver(&self) -> MailboxReceiver<()> {
		self.wake.receiver()
	}

	/// Queues a warning and requests a repaint so it surfaces promptly even
	/// when no input is arriving.
	pub async fn post(&self, msg: impl Into<String>) {
		let msg = msg.into();
		tracing::warn!(message = msg.as_str(), "editor.warning");
		self.pending.lock().push(msg);
		let _ = self.wake.sender().try_send(()).await;
		self.redraw.request().await;
	}

	/// Appends all queued warnings to the row tag. The caller holds the
	/// coarse lock. Returns whether anything was flushed.
	pub fn flush_into(&self, state: &mut EditorState) -> bool {
		let drained: Vec<String> = std::mem::take(&mut *self.pending.lock());
		if drained.is_empty() {
			return false;
		}
		for msg in drained {
			let at = state.tag.len();
			if at > 0 && !state.tag.content().ends_with(['\n', ' ']) {
				state.tag.insert(at, " ");
			}
			let at = state.tag.len();
			state.tag.insert(at, &msg);
		}
		state.tag.commit();
		true
	}
}

#[cfg(test)]
mod tests {
	use scriv_worker::{Mailbox, MailboxPolicy};

	use super::*;
	use crate::state::Rect;

	#[tokio::test]
	async fn warnings_fold_into_row_tag_in_order() {
		let repaint = Mailbox::new(1, MailboxPolicy::LatestWins);
		let warn = Warn::new(RedrawHandle::new(repaint.sender()));
		let mut state = EditorState::new(
			Rect {
				x: 0,
				y: 0,
				w: 100,
				h: 100,
			},
			1,
		);

		warn.post("no such process").await;
		warn.post("sel: export failed").await;

		assert!(warn.flush_into(&mut state));
		let tag = state.tag.content();
		let first = tag.find("no such process").unwrap();
		let second = tag.find("sel: export failed").unwrap();
		assert!(first < second);

		// Nothing left after a flush.
		assert!(!warn.flush_into(&mut state));

		// The repaint mailbox saw at least one coalesced request.
		assert!(repaint.receiver().try_recv().await.is_some());
	}
}
