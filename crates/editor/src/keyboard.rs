//! The key actor.
//!
//! Routes keystrokes to whichever text has focus, falling back to the text
//! under the last pointer position. Typing into a tag arms a one-shot timer
//! that commits the pending edit as if the user had confirmed it; every
//! further keystroke replaces the timer. Queued keystrokes are drained
//! non-blocking after each receive so a fast burst costs one repaint.

use std::time::Duration;

use tokio::time::Instant;

use scriv_worker::{Mailbox, MailboxPolicy, MailboxSender, TaskClass};

use crate::redraw::RedrawHandle;
use crate::state::{Shared, TextId, TextKind};

/// How long a tag edit may sit uncommitted after the last keystroke.
pub const TAG_COMMIT_DELAY: Duration = Duration::from_millis(500);

const QUEUE_DEPTH: usize = 128;

/// Spawns the key actor and returns its keystroke queue.
pub fn spawn_key_actor(shared: Shared, redraw: RedrawHandle) -> MailboxSender<char> {
	let mailbox = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let tx = mailbox.sender();
	let rx = mailbox.receiver();

	scriv_worker::spawn(TaskClass::Interactive, async move {
		let mut deadline: Option<Instant> = None;
		let mut pending_tag: Option<TextId> = None;

		loop {
			let sleep = async {
				match deadline {
					Some(at) => tokio::time::sleep_until(at).await,
					None => std::future::pending().await,
				}
			};

			tokio::select! {
				biased;
				key = rx.recv() => {
					let Some(key) = key else { break };
					// Batch whatever else is already queued before locking.
					let mut batch = vec![key];
					while let Some(key) = rx.try_recv().await {
						batch.push(key);
					}
					{
						let mut state = shared.lock();
						let mut last_target = None;
						for key in batch {
							if let Some(t) = state.type_char(key) {
								last_target = Some(t);
							}
						}
						match last_target.and_then(|t| state.text(t)).map(|t| (t.id(), t.kind())) {
							Some((id, TextKind::Tag | TextKind::RowTag)) => {
								deadline = Some(Instant::now() + TAG_COMMIT_DELAY);
								pending_tag = Some(id);
							}
							_ => {
								deadline = None;
								pending_tag = None;
							}
						}
					}
					redraw.request().await;
				}
				_ = sleep => {
					deadline = None;
					if let Some(id) = pending_tag.take() {
						{
							let mut state = shared.lock();
							if let Some(win) = state.text(id).and_then(|t| t.window()) {
								state.commit_tag(win);
							} else {
								state.tag.commit();
							}
						}
						tracing::trace!(text = id.0, "key.tag_commit");
					}
					redraw.request().await;
				}
			}
		}
		tracing::debug!("key.actor.exit");
	});

	tx
}
