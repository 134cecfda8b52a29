/// Shared execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Latency-sensitive dispatch loops (keyboard, pointer).
	Interactive,
	/// Background async work (process bookkeeping, window creation).
	Background,
	/// Blocking or file-protocol I/O (selection watcher, handle workers).
	IoBlocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::IoBlocking => "io_blocking",
		}
	}
}
