//! Selection exchange with the external selection service.
//!
//! Exporting publishes the active selection through a small file-based
//! handshake and leaves a watcher streaming back edits made to the exported
//! copy. Each export bumps a monotonic generation id; change messages carry
//! the generation they were produced under, so anything still in flight from
//! an older export is detectably stale and gets dropped by the import actor
//! instead of corrupting the current selection.

pub mod import;
pub mod mem;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use scriv_worker::{GenerationClock, MailboxSender, TaskClass};

use crate::state::TextId;
use crate::warn::Warn;

pub use import::spawn_import_actor;

/// Chunk size for streaming revision payloads back to the import actor.
pub const REVISION_CHUNK: usize = 8 * 1024;

/// One update streamed back from the exported copy. Empty data means the
/// selection was cleared on the far end.
#[derive(Debug, Clone)]
pub struct SelectionChange {
	pub generation: u64,
	pub data: Vec<u8>,
}

/// Which text owns the exported selection, and under which generation.
#[derive(Debug, Default)]
pub struct ExportState {
	pub generation: u64,
	pub owner: Option<TextId>,
}

/// The selection service wire protocol, behind a seam so tests and the
/// in-process service share the watcher logic.
#[async_trait]
pub trait SelectionService: Send + Sync + 'static {
	/// Announces a new export context; returns the handle id assigned by
	/// the service.
	async fn announce(&self, context: &[u8]) -> io::Result<String>;
	/// Re-reads the first `len` stored bytes of the handle's text.
	async fn stored_context(&self, handle: &str, len: usize) -> io::Result<Vec<u8>>;
	/// Stores the exported bytes under the handle.
	async fn publish(&self, handle: &str, data: &[u8]) -> io::Result<()>;
	/// Blocks for the next revision id on the watch stream. `None` means
	/// the far end closed it.
	async fn next_revision(&self) -> io::Result<Option<String>>;
	/// Reads one revision's full payload.
	async fn read_revision(&self, handle: &str) -> io::Result<Vec<u8>>;
}

/// File-based service under `<root>/sel/`, matching the external protocol:
/// handle ids are 4-byte decimals read back from `sel/new`, per-handle text
/// lives at `sel/<id>-text`.
pub struct FsSelectionService {
	root: PathBuf,
	watch: tokio::sync::Mutex<Option<tokio::fs::File>>,
}

impl FsSelectionService {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			watch: tokio::sync::Mutex::new(None),
		}
	}

	fn new_path(&self) -> PathBuf {
		self.root.join("sel").join("new")
	}

	fn text_path(&self, handle: &str) -> PathBuf {
		self.root.join("sel").join(format!("{handle}-text"))
	}
}

#[async_trait]
impl SelectionService for FsSelectionService {
	async fn announce(&self, context: &[u8]) -> io::Result<String> {
		let path = self.new_path();
		{
			let mut f = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
			f.write_all(context).await?;
		}
		let mut watch = tokio::fs::File::open(&path).await?;
		let mut id = [0u8; 4];
		watch.read_exact(&mut id).await?;
		*self.watch.lock().await = Some(watch);
		String::from_utf8(id.to_vec()).map_err(|_| io::Error::other("selection handle id is not decimal text"))
	}

	async fn stored_context(&self, handle: &str, len: usize) -> io::Result<Vec<u8>> {
		let mut f = tokio::fs::File::open(self.text_path(handle)).await?;
		let mut buf = vec![0u8; len];
		f.read_exact(&mut buf).await?;
		Ok(buf)
	}

	async fn publish(&self, handle: &str, data: &[u8]) -> io::Result<()> {
		let mut f = tokio::fs::OpenOptions::new()
			.write(true)
			.truncate(true)
			.open(self.text_path(handle))
			.await?;
		f.write_all(data).await
	}

	async fn next_revision(&self) -> io::Result<Option<String>> {
		let mut watch = self.watch.lock().await;
		let Some(f) = watch.as_mut() else {
			return Ok(None);
		};
		f.seek(io::SeekFrom::Start(0)).await?;
		let mut id = [0u8; 4];
		match f.read_exact(&mut id).await {
			Ok(_) => Ok(Some(
				String::from_utf8(id.to_vec()).map_err(|_| io::Error::other("revision id is not decimal text"))?,
			)),
			Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
			Err(err) => Err(err),
		}
	}

	async fn read_revision(&self, handle: &str) -> io::Result<Vec<u8>> {
		tokio::fs::read(self.text_path(handle)).await
	}
}

/// Handle for exporting the active selection. Cloneable; one watcher runs
/// per export and older watchers fade out through the generation gate.
#[derive(Clone)]
pub struct Exporter {
	service: Arc<dyn SelectionService>,
	clock: GenerationClock,
	state: Arc<Mutex<ExportState>>,
	changes: MailboxSender<SelectionChange>,
	warn: Warn,
}

impl Exporter {
	pub fn new(
		service: Arc<dyn SelectionService>,
		state: Arc<Mutex<ExportState>>,
		changes: MailboxSender<SelectionChange>,
		warn: Warn,
	) -> Self {
		Self {
			service,
			clock: GenerationClock::new(),
			state,
			changes,
			warn,
		}
	}

	/// Current export generation.
	pub fn generation(&self) -> u64 {
		self.clock.current()
	}

	/// Publishes `bytes` as the new exported selection of `text`.
	///
	/// No-op when the selection is empty. Bumps the generation, records the
	/// new owner, and leaves a watcher streaming edits back. A service-side
	/// race (another export landed between our announce and our readback)
	/// aborts the watcher silently.
	pub async fn export(&self, text: TextId, context: String, bytes: Vec<u8>) {
		if bytes.is_empty() {
			return;
		}
		let generation = self.clock.next();
		{
			let mut state = self.state.lock();
			state.generation = generation;
			state.owner = Some(text);
		}
		tracing::debug!(generation, text = text.0, "sel.export");

		let service = Arc::clone(&self.service);
		let changes = self.changes.clone();
		let warn = self.warn.clone();
		let context = context.into_bytes();
		scriv_worker::spawn(TaskClass::IoBlocking, async move {
			if let Err(err) = watch(service, changes, generation, context, bytes).await {
				warn.post(format!("sel: {err}")).await;
			}
		});
	}
}

/// The export handshake plus the revision watch loop.
async fn watch(
	service: Arc<dyn SelectionService>,
	changes: MailboxSender<SelectionChange>,
	generation: u64,
	context: Vec<u8>,
	bytes: Vec<u8>,
) -> io::Result<()> {
	let handle = service.announce(&context).await?;

	// Another export may have raced us between announce and here; the
	// handle then stores someone else's context and this watcher stands
	// down without complaint.
	let stored = service.stored_context(&handle, context.len()).await?;
	if stored != context {
		tracing::trace!(generation, "sel.export.raced");
		return Ok(());
	}

	service.publish(&handle, &bytes).await?;

	while let Some(rev) = service.next_revision().await? {
		let data = service.read_revision(&rev).await?;
		// Each revision replaces the selection: a clear first, then the
		// payload in chunks appended at the selection end.
		let cleared = changes
			.send(SelectionChange {
				generation,
				data: Vec::new(),
			})
			.await;
		if cleared.is_err() {
			break;
		}
		let mut sent_all = true;
		for chunk in data.chunks(REVISION_CHUNK) {
			if changes
				.send(SelectionChange {
					generation,
					data: chunk.to_vec(),
				})
				.await
				.is_err()
			{
				sent_all = false;
				break;
			}
		}
		if !sent_all {
			break;
		}
	}
	tracing::trace!(generation, "sel.watch.closed");
	Ok(())
}

#[cfg(test)]
mod tests {
	use scriv_worker::{Mailbox, MailboxPolicy};

	use super::mem::MemSelectionService;
	use super::*;
	use crate::redraw::RedrawHandle;

	fn warn() -> Warn {
		Warn::new(RedrawHandle::new(Mailbox::new(1, MailboxPolicy::LatestWins).sender()))
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn export_publishes_and_streams_revisions() {
		let service = Arc::new(MemSelectionService::new());
		let changes = Mailbox::new(64, MailboxPolicy::Backpressure);
		let state = Arc::new(Mutex::new(ExportState::default()));
		let exporter = Exporter::new(service.clone(), state, changes.sender(), warn());

		exporter
			.export(TextId(1), "scratch".into(), b"hello".to_vec())
			.await;
		service.wait_published().await;
		assert_eq!(service.stored_text().await, b"hello");

		service.push_revision(b"edited".to_vec()).await;
		let rx = changes.receiver();
		let clear = rx.recv().await.unwrap();
		assert_eq!(clear.generation, 1);
		assert!(clear.data.is_empty());
		let data = rx.recv().await.unwrap();
		assert_eq!(data.data, b"edited");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn raced_handshake_aborts_silently() {
		let service = Arc::new(MemSelectionService::new());
		service.race_next_announce().await;
		let changes = Mailbox::new(64, MailboxPolicy::Backpressure);
		let state = Arc::new(Mutex::new(ExportState::default()));
		let exporter = Exporter::new(service.clone(), state, changes.sender(), warn());

		exporter.export(TextId(1), "scratch".into(), b"hello".to_vec()).await;
		tokio::time::sleep(std::time::Duration::from_millis(30)).await;

		// The winner's context is untouched and nothing was streamed.
		assert_eq!(service.stored_text().await, b"someone else");
		assert!(changes.receiver().try_recv().await.is_none());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn empty_selection_is_a_no_op() {
		let service = Arc::new(MemSelectionService::new());
		let changes = Mailbox::new(4, MailboxPolicy::Backpressure);
		let state = Arc::new(Mutex::new(ExportState::default()));
		let exporter = Exporter::new(service.clone(), Arc::clone(&state), changes.sender(), warn());

		exporter.export(TextId(1), "scratch".into(), Vec::new()).await;
		assert_eq!(exporter.generation(), 0);
		assert!(state.lock().owner.is_none());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn fs_service_reads_back_published_text() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::create_dir_all(dir.path().join("sel")).await.unwrap();
		tokio::fs::write(dir.path().join("sel").join("0001-text"), b"")
			.await
			.unwrap();
		let service = FsSelectionService::new(dir.path());

		service.publish("0001", b"exported bytes").await.unwrap();
		assert_eq!(service.read_revision("0001").await.unwrap(), b"exported bytes");
		assert_eq!(service.stored_context("0001", 8).await.unwrap(), b"exported");
		// No announce happened, so there is no watch stream to poll.
		assert!(service.next_revision().await.unwrap().is_none());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn each_export_bumps_the_generation() {
		let service = Arc::new(MemSelectionService::new());
		let changes = Mailbox::new(64, MailboxPolicy::Backpressure);
		let state = Arc::new(Mutex::new(ExportState::default()));
		let exporter = Exporter::new(service.clone(), Arc::clone(&state), changes.sender(), warn());

		exporter.export(TextId(1), "a".into(), b"x".to_vec()).await;
		exporter.export(TextId(2), "b".into(), b"y".to_vec()).await;
		assert_eq!(exporter.generation(), 2);
		let state = state.lock();
		assert_eq!(state.generation, 2);
		assert_eq!(state.owner, Some(TextId(2)));
	}
}
