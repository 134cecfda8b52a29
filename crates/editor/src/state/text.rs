use ropey::Rope;

use super::{TextId, WindowId};

/// What role a text plays in the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
	/// The row-wide command-line buffer.
	RowTag,
	/// A window's metadata line.
	Tag,
	/// A window's content.
	Body,
}

/// An addressable, mutable run of characters with a selection `[q0, q1)`.
///
/// Offsets are in chars. Edits track a pending flag so a later `commit`
/// can observe whether anything changed since the last one; for Tag texts
/// that is what drives name synchronization.
#[derive(Debug, Clone)]
pub struct Text {
	id: TextId,
	kind: TextKind,
	window: Option<WindowId>,
	buffer: Rope,
	pub q0: usize,
	pub q1: usize,
	pending: bool,
}

impl Text {
	pub(crate) fn new(id: TextId, kind: TextKind, window: Option<WindowId>) -> Self {
		Self {
			id,
			kind,
			window,
			buffer: Rope::new(),
			q0: 0,
			q1: 0,
			pending: false,
		}
	}

	pub fn id(&self) -> TextId {
		self.id
	}

	pub fn kind(&self) -> TextKind {
		self.kind
	}

	pub fn window(&self) -> Option<WindowId> {
		self.window
	}

	pub fn len(&self) -> usize {
		self.buffer.len_chars()
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.len_chars() == 0
	}

	pub fn content(&self) -> String {
		self.buffer.to_string()
	}

	/// Inserts `s` at char offset `at`, shifting the selection to keep it
	/// over the same characters. Inserting exactly at `q1` extends the
	/// selection; callers that care re-select explicitly.
	pub fn insert(&mut self, at: usize, s: &str) {
		let at = at.min(self.buffer.len_chars());
		self.buffer.insert(at, s);
		let n = s.chars().count();
		if at <= self.q0 {
			self.q0 += n;
		}
		if at <= self.q1 {
			self.q1 += n;
		}
		self.pending = true;
	}

	/// Deletes chars `[r0, r1)`, remapping the selection.
	pub fn delete(&mut self, r0: usize, r1: usize) {
		let len = self.buffer.len_chars();
		let r0 = r0.min(len);
		let r1 = r1.min(len);
		if r0 >= r1 {
			return;
		}
		self.buffer.remove(r0..r1);
		let n = r1 - r0;
		self.q0 = remap(self.q0, r0, r1, n);
		self.q1 = remap(self.q1, r0, r1, n);
		self.pending = true;
	}

	/// Sets the selection, clamped to the buffer.
	pub fn set_select(&mut self, q0: usize, q1: usize) {
		let len = self.buffer.len_chars();
		self.q0 = q0.min(len);
		self.q1 = q1.max(self.q0).min(len);
	}

	pub fn selection(&self) -> (usize, usize) {
		(self.q0, self.q1)
	}

	pub fn selection_str(&self) -> String {
		self.buffer.slice(self.q0..self.q1).to_string()
	}

	/// Replaces the selection with `s` and leaves the caret after it.
	pub fn replace_selection(&mut self, s: &str) {
		let q0 = self.q0;
		self.delete(self.q0, self.q1);
		self.insert(q0, s);
		let caret = q0 + s.chars().count();
		self.set_select(caret, caret);
	}

	/// Marks pending edits committed. Returns whether anything was pending.
	pub fn commit(&mut self) -> bool {
		std::mem::take(&mut self.pending)
	}

	pub fn has_pending(&self) -> bool {
		self.pending
	}

	/// Finds the first occurrence of `needle` and selects it.
	pub fn search(&mut self, needle: &str) -> bool {
		if needle.is_empty() {
			return false;
		}
		let hay = self.content();
		let Some(byte_at) = hay.find(needle) else {
			return false;
		};
		let q0 = hay[..byte_at].chars().count();
		let q1 = q0 + needle.chars().count();
		self.set_select(q0, q1);
		true
	}

	/// Expands char offset `at` to the surrounding run of non-whitespace.
	pub fn word_at(&self, at: usize) -> (usize, usize) {
		let len = self.buffer.len_chars();
		let at = at.min(len);
		let mut start = at;
		while start > 0 && !self.buffer.char(start - 1).is_whitespace() {
			start -= 1;
		}
		let mut end = at;
		while end < len && !self.buffer.char(end).is_whitespace() {
			end += 1;
		}
		(start, end)
	}

	/// Char offset of the start of `line`, clamped to the last line.
	pub fn line_start(&self, line: usize) -> usize {
		let last = self.buffer.len_lines().saturating_sub(1);
		self.buffer.line_to_char(line.min(last))
	}

	pub fn line_len(&self, line: usize) -> usize {
		let last = self.buffer.len_lines().saturating_sub(1);
		let line = line.min(last);
		self.buffer
			.line(line)
			.len_chars()
			.saturating_sub(usize::from(line < last))
	}
}

fn remap(q: usize, r0: usize, r1: usize, n: usize) -> usize {
	if q <= r0 {
		q
	} else if q >= r1 {
		q - n
	} else {
		r0
	}
}
