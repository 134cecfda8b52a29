//! Clipboard seam.
//!
//! The editor only defines the interface; the terminal front end provides a
//! concrete provider. Writes that fail (ownership could not be asserted, or
//! the payload is over the size ceiling) are logged and abandoned, never
//! retried.

use thiserror::Error;

/// Hard ceiling on clipboard payloads, in bytes.
pub const MAX_CLIP: usize = 100 * 1024;

#[derive(Debug, Error)]
pub enum ClipboardError {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error("clipboard ownership could not be asserted")]
	Ownership,
	#[error("clipboard payload of {0} bytes exceeds the {MAX_CLIP} byte ceiling")]
	TooLarge(usize),
	#[error("clipboard provider does not support reading")]
	ReadingNotSupported,
}

pub trait ClipboardProvider: Send + Sync + 'static {
	fn name(&self) -> &str;
	fn get_contents(&self) -> Result<Option<String>, ClipboardError>;
	fn set_contents(&self, content: &str) -> Result<(), ClipboardError>;
}

/// Stores a copy of the last write, enforcing the ceiling. Used when no OS
/// clipboard is reachable.
#[derive(Debug, Default)]
pub struct MemClipboard {
	content: parking_lot::Mutex<Option<String>>,
}

impl ClipboardProvider for MemClipboard {
	fn name(&self) -> &str {
		"memory"
	}

	fn get_contents(&self) -> Result<Option<String>, ClipboardError> {
		Ok(self.content.lock().clone())
	}

	fn set_contents(&self, content: &str) -> Result<(), ClipboardError> {
		if content.len() > MAX_CLIP {
			return Err(ClipboardError::TooLarge(content.len()));
		}
		*self.content.lock() = Some(content.to_string());
		Ok(())
	}
}

/// Write that logs failures instead of surfacing them.
pub fn set_contents_logged(provider: &dyn ClipboardProvider, content: &str) {
	if let Err(err) = provider.set_contents(content) {
		tracing::warn!(provider = provider.name(), error = %err, "clipboard.set_failed");
	}
}
