//! In-memory selection service.
//!
//! Speaks the same handle/revision protocol as the file-based service, with
//! knobs for driving revisions and provoking the announce race. Used by the
//! tests and by the terminal front end when no external service is mounted.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use scriv_worker::{Mailbox, MailboxPolicy};

use super::SelectionService;

struct MemState {
	/// Text stored under the current handle.
	text: Vec<u8>,
	/// Whether an export has published since the last announce.
	published: bool,
	/// Payloads by revision id.
	revisions: HashMap<String, Vec<u8>>,
	/// When set, the next announce finds this context stored instead of
	/// its own, as if another export won the handshake.
	race_context: Option<Vec<u8>>,
}

pub struct MemSelectionService {
	state: Mutex<MemState>,
	next_id: AtomicU64,
	revision_queue: Mailbox<String>,
	published: Notify,
}

impl Default for MemSelectionService {
	fn default() -> Self {
		Self::new()
	}
}

impl MemSelectionService {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(MemState {
				text: Vec::new(),
				published: false,
				revisions: HashMap::new(),
				race_context: None,
			}),
			next_id: AtomicU64::new(1),
			revision_queue: Mailbox::new(64, MailboxPolicy::Backpressure),
			published: Notify::new(),
		}
	}

	/// Makes the next announce lose the handshake race.
	pub async fn race_next_announce(&self) {
		self.state.lock().await.race_context = Some(b"someone else".to_vec());
	}

	/// Blocks until an export has published its bytes.
	pub async fn wait_published(&self) {
		loop {
			let notified = self.published.notified();
			if self.state.lock().await.published {
				return;
			}
			notified.await;
		}
	}

	pub async fn stored_text(&self) -> Vec<u8> {
		self.state.lock().await.text.clone()
	}

	/// Stores an edited copy as a new revision and wakes the watcher.
	pub async fn push_revision(&self, data: Vec<u8>) {
		let id = format!("{:04}", self.next_id.fetch_add(1, Ordering::AcqRel));
		self.state.lock().await.revisions.insert(id.clone(), data);
		let _ = self.revision_queue.sender().send(id).await;
	}

	/// Ends the watch stream, as if the far end closed it.
	pub async fn close_watch(&self) {
		self.revision_queue.sender().close().await;
	}
}

#[async_trait]
impl SelectionService for MemSelectionService {
	async fn announce(&self, context: &[u8]) -> io::Result<String> {
		let mut state = self.state.lock().await;
		state.published = false;
		state.text = match state.race_context.take() {
			Some(other) => other,
			None => context.to_vec(),
		};
		Ok(format!("{:04}", self.next_id.fetch_add(1, Ordering::AcqRel)))
	}

	async fn stored_context(&self, _handle: &str, len: usize) -> io::Result<Vec<u8>> {
		let state = self.state.lock().await;
		if state.text.len() < len {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stored context too short"));
		}
		Ok(state.text[..len].to_vec())
	}

	async fn publish(&self, _handle: &str, data: &[u8]) -> io::Result<()> {
		let mut state = self.state.lock().await;
		state.text = data.to_vec();
		state.published = true;
		drop(state);
		self.published.notify_waiters();
		Ok(())
	}

	async fn next_revision(&self) -> io::Result<Option<String>> {
		Ok(self.revision_queue.receiver().recv().await)
	}

	async fn read_revision(&self, handle: &str) -> io::Result<Vec<u8>> {
		self.state
			.lock()
			.await
			.revisions
			.get(handle)
			.cloned()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown revision"))
	}
}
