use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic generation clock.
///
/// The first call to [`GenerationClock::next`] returns 1; generation 0 is
/// reserved as "nothing issued yet" so consumers can gate on a live value.
/// The counter only ever moves forward, which is what lets stale asynchronous
/// updates be detected and discarded instead of applied out of order.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new clock; the first issued generation is 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}

	/// Returns the most recently issued generation, 0 if none.
	pub fn current(&self) -> u64 {
		self.next.load(Ordering::Acquire)
	}
}
