//! The window creation actor.
//!
//! Non-interactive collaborators (protocol handlers, startup file loading)
//! must not mutate the layout while the interactive actors are dispatching.
//! They request windows here instead; requests are served strictly in
//! arrival order with exactly one reply each.

use tokio::sync::oneshot;

use scriv_worker::{Mailbox, MailboxPolicy, MailboxSender, TaskClass};

use crate::redraw::RedrawHandle;
use crate::state::{Shared, WindowId};

const QUEUE_DEPTH: usize = 16;

pub struct NewWindowRequest {
	pub name: String,
	pub column: usize,
	pub reply: oneshot::Sender<WindowId>,
}

/// Cloneable requester wrapping the request/reply exchange.
#[derive(Clone)]
pub struct WindowCreator {
	tx: MailboxSender<NewWindowRequest>,
}

impl WindowCreator {
	/// Creates a window and waits for its id. `None` after shutdown.
	pub async fn create(&self, name: &str, column: usize) -> Option<WindowId> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(NewWindowRequest {
				name: name.to_string(),
				column,
				reply,
			})
			.await
			.ok()?;
		rx.await.ok()
	}
}

/// Spawns the window creation actor.
pub fn spawn_window_actor(shared: Shared, redraw: RedrawHandle) -> WindowCreator {
	let mailbox: Mailbox<NewWindowRequest> = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let tx = mailbox.sender();
	let rx = mailbox.receiver();

	scriv_worker::spawn(TaskClass::Background, async move {
		while let Some(req) = rx.recv().await {
			let id = {
				let mut state = shared.lock();
				state.new_window(req.column, &req.name)
			};
			tracing::debug!(window = id.0, name = req.name.as_str(), "window.create");
			let _ = req.reply.send(id);
			redraw.request().await;
		}
		tracing::debug!("window.actor.exit");
	});

	WindowCreator { tx }
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::state::{EditorState, Rect};

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn requests_get_one_reply_each_in_order() {
		let shared = EditorState::new(
			Rect {
				x: 0,
				y: 0,
				w: 800,
				h: 600,
			},
			2,
		)
		.into_shared();
		let redraw = RedrawHandle::new(Mailbox::new(1, MailboxPolicy::LatestWins).sender());
		let creator = spawn_window_actor(Arc::clone(&shared), redraw);

		let a = creator.create("one", 0).await.unwrap();
		let b = creator.create("two", 1).await.unwrap();
		let c = creator.create("three", 0).await.unwrap();
		assert!(a < b && b < c);

		let state = shared.lock();
		assert_eq!(state.window(a).unwrap().name, "one");
		assert_eq!(state.window(c).unwrap().name, "three");
		assert_eq!(state.columns[0].windows.len(), 2);
		assert_eq!(state.columns[1].windows.len(), 1);
	}
}
