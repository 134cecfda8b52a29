use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// Overflow policy for a bounded mailbox.
///
/// The dispatch actors use `Backpressure` for their event queues (events are
/// handled strictly in arrival order, nothing may be lost) and `LatestWins`
/// for repaint requests, which are fire-and-forget and must never queue more
/// than one outstanding notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxPolicy {
	/// Wait for capacity when full.
	Backpressure,
	/// Keep only the most recent message.
	LatestWins,
}

/// Outcome from enqueueing a mailbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSendOutcome {
	/// Message was enqueued without replacement.
	Enqueued,
	/// Message replaced previously queued ones (`LatestWins`).
	Coalesced,
}

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSendError {
	/// Mailbox is closed.
	Closed,
	/// Queue is full and a non-blocking send was used.
	Full,
}

struct MailboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct MailboxInner<T> {
	capacity: usize,
	policy: MailboxPolicy,
	state: Mutex<MailboxState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
}

/// Multi-producer mailbox sender.
pub struct MailboxSender<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Mailbox receiver.
pub struct MailboxReceiver<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Bounded mailbox used by the dispatch actors.
pub struct Mailbox<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Mailbox<T> {
	/// Creates a bounded mailbox.
	pub fn new(capacity: usize, policy: MailboxPolicy) -> Self {
		assert!(capacity > 0, "mailbox capacity must be > 0");
		Self {
			inner: Arc::new(MailboxInner {
				capacity,
				policy,
				state: Mutex::new(MailboxState {
					queue: VecDeque::with_capacity(capacity),
					closed: false,
				}),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
		}
	}

	/// Returns a sender handle.
	pub fn sender(&self) -> MailboxSender<T> {
		MailboxSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Returns the receiver handle.
	pub fn receiver(&self) -> MailboxReceiver<T> {
		MailboxReceiver {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> MailboxSender<T> {
	/// Requests mailbox closure. The receiver drains existing items then
	/// returns `None`.
	pub async fn close(&self) {
		let mut state = self.inner.state.lock().await;
		state.closed = true;
		drop(state);
		self.inner.notify_recv.notify_waiters();
		self.inner.notify_send.notify_waiters();
	}

	/// Non-blocking enqueue.
	pub async fn try_send(&self, msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
		let mut state = self.inner.state.lock().await;
		enqueue(&self.inner, &mut state, msg)
	}

	/// Enqueue honoring policy; `Backpressure` waits for capacity.
	///
	/// The notification future is registered before re-checking capacity so a
	/// pop between unlock and await cannot lose the wakeup.
	pub async fn send(&self, msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
		if self.inner.policy == MailboxPolicy::Backpressure {
			loop {
				let notified = self.inner.notify_send.notified();

				let mut state = self.inner.state.lock().await;
				if state.closed {
					return Err(MailboxSendError::Closed);
				}
				if state.queue.len() < self.inner.capacity {
					state.queue.push_back(msg);
					self.inner.notify_recv.notify_one();
					return Ok(MailboxSendOutcome::Enqueued);
				}
				drop(state);
				notified.await;
			}
		}

		let mut state = self.inner.state.lock().await;
		enqueue(&self.inner, &mut state, msg)
	}

	/// Returns current queue length.
	pub async fn len(&self) -> usize {
		self.inner.state.lock().await.queue.len()
	}
}

impl<T> MailboxReceiver<T> {
	/// Receives one message. Returns `None` once the mailbox is closed and
	/// drained.
	pub async fn recv(&self) -> Option<T> {
		loop {
			let mut state = self.inner.state.lock().await;
			if let Some(msg) = state.queue.pop_front() {
				drop(state);
				self.inner.notify_send.notify_one();
				return Some(msg);
			}
			if state.closed {
				return None;
			}
			drop(state);
			self.inner.notify_recv.notified().await;
		}
	}

	/// Non-blocking receive for drain passes between blocking waits.
	pub async fn try_recv(&self) -> Option<T> {
		let mut state = self.inner.state.lock().await;
		let msg = state.queue.pop_front();
		if msg.is_some() {
			self.inner.notify_send.notify_one();
		}
		msg
	}
}

fn enqueue<T>(inner: &MailboxInner<T>, state: &mut MailboxState<T>, msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
	if state.closed {
		return Err(MailboxSendError::Closed);
	}

	match inner.policy {
		MailboxPolicy::LatestWins => {
			let had_items = !state.queue.is_empty();
			state.queue.clear();
			state.queue.push_back(msg);
			inner.notify_recv.notify_one();
			if had_items {
				Ok(MailboxSendOutcome::Coalesced)
			} else {
				Ok(MailboxSendOutcome::Enqueued)
			}
		}
		MailboxPolicy::Backpressure => {
			if state.queue.len() < inner.capacity {
				state.queue.push_back(msg);
				inner.notify_recv.notify_one();
				Ok(MailboxSendOutcome::Enqueued)
			} else {
				Err(MailboxSendError::Full)
			}
		}
	}
}
