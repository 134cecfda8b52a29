//! File-handle pool for protocol serving.
//!
//! Protocol requests against editor state are executed on dedicated handle
//! workers. Handles are pooled: allocation pops the free list or builds a
//! fresh handle with its own job channel and worker, freeing pushes the
//! handle back. A handle never has more than one worker, and reuse is O(1).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::oneshot;

use scriv_worker::{Mailbox, MailboxPolicy, MailboxSendError, MailboxSender, TaskClass};

const QUEUE_DEPTH: usize = 32;

/// Work executed on a handle's worker.
pub type FidJob = Box<dyn FnOnce() + Send + 'static>;

/// A pooled protocol handle with its dedicated worker.
pub struct Fid {
	id: u64,
	jobs: MailboxSender<FidJob>,
}

impl Fid {
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Runs `job` on this handle's worker. Jobs on one handle execute in
	/// submission order.
	pub async fn submit(&self, job: FidJob) -> Result<(), MailboxSendError> {
		self.jobs.send(job).await.map(|_| ())
	}
}

/// Handle to the allocator actor.
#[derive(Clone)]
pub struct FidAllocator {
	alloc: MailboxSender<oneshot::Sender<Fid>>,
	free: MailboxSender<Fid>,
	spawned: Arc<AtomicUsize>,
}

impl FidAllocator {
	/// Allocates a handle, reusing a freed one when available. `None` after
	/// shutdown.
	pub async fn alloc(&self) -> Option<Fid> {
		let (tx, rx) = oneshot::channel();
		self.alloc.send(tx).await.ok()?;
		rx.await.ok()
	}

	/// Returns a handle to the pool.
	pub async fn free(&self, fid: Fid) {
		let _ = self.free.send(fid).await;
	}

	/// Number of workers ever spawned.
	pub fn workers_spawned(&self) -> usize {
		self.spawned.load(Ordering::Acquire)
	}
}

/// Spawns the allocator actor.
pub fn spawn_fid_allocator() -> FidAllocator {
	let alloc = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let free = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
	let spawned = Arc::new(AtomicUsize::new(0));

	let allocator = FidAllocator {
		alloc: alloc.sender(),
		free: free.sender(),
		spawned: Arc::clone(&spawned),
	};

	let (alloc_rx, free_rx) = (alloc.receiver(), free.receiver());
	scriv_worker::spawn(TaskClass::Background, async move {
		let mut free_list: Vec<Fid> = Vec::new();
		let mut next_id: u64 = 1;
		loop {
			tokio::select! {
				biased;
				Some(reply) = alloc_rx.recv() => {
					let fid = match free_list.pop() {
						Some(fid) => fid,
						None => {
							let jobs: Mailbox<FidJob> = Mailbox::new(QUEUE_DEPTH, MailboxPolicy::Backpressure);
							let rx = jobs.receiver();
							scriv_worker::spawn(TaskClass::IoBlocking, async move {
								while let Some(job) = rx.recv().await {
									job();
								}
							});
							spawned.fetch_add(1, Ordering::AcqRel);
							let fid = Fid {
								id: next_id,
								jobs: jobs.sender(),
							};
							next_id += 1;
							tracing::trace!(fid = fid.id, "fid.worker.spawn");
							fid
						}
					};
					// Caller gave up waiting; recycle instead of leaking.
					if let Err(fid) = reply.send(fid) {
						free_list.push(fid);
					}
				}
				Some(fid) = free_rx.recv() => {
					free_list.push(fid);
				}
				else => break,
			}
		}
		tracing::debug!("fid.actor.exit");
	});

	allocator
}
