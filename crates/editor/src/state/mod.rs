//! The shared editable model.
//!
//! All dispatch actors mutate one [`EditorState`] under a single coarse
//! [`parking_lot::Mutex`]. Handlers hold the lock for the whole handling of
//! one event, so every actor observes a consistent model and a fully-applied
//! previous event. Per-window render state sits behind its own inner lock,
//! acquired only while the coarse lock is already held.

mod text;

use std::sync::Arc;

use parking_lot::Mutex;

pub use text::{Text, TextKind};

/// Stable identity of a [`Text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextId(pub u64);

/// Stable identity of a [`Window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

/// The coarse lock every actor serializes against.
pub type Shared = Arc<Mutex<EditorState>>;

/// Screen position in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
	pub x: i32,
	pub y: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
	pub x: i32,
	pub y: i32,
	pub w: i32,
	pub h: i32,
}

impl Rect {
	pub fn contains(&self, p: Point) -> bool {
		p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
	}
}

/// Line height of the monospace cell grid, in pixels.
pub const LINE_H: i32 = 18;
/// Cell width of the monospace cell grid, in pixels.
pub const CELL_W: i32 = 9;
/// Width of the scroll gutter and the tag drag handle, in pixels.
pub const GUTTER_W: i32 = 12;

/// Which control a screen position landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
	/// The scroll strip down the left edge of a body.
	ScrollGutter,
	/// The grab box at the left of a window tag.
	DragHandle,
	/// Editable characters.
	Content,
}

/// Result of hit-testing a screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
	pub text: TextId,
	pub window: Option<WindowId>,
	pub zone: Zone,
}

/// Per-window render state, behind its own lock so repaint bookkeeping does
/// not require the coarse lock once a reference has been cloned out.
#[derive(Debug, Default)]
pub struct WinRender {
	/// First body line shown.
	pub top_line: usize,
}

#[derive(Debug)]
pub struct Window {
	pub id: WindowId,
	/// First space-separated token of the tag; kept in sync on tag commit.
	pub name: String,
	pub tag: Text,
	pub body: Text,
	pub rect: Rect,
	pub dirty: bool,
	pub render: Arc<Mutex<WinRender>>,
}

impl Window {
	fn tag_rect(&self) -> Rect {
		Rect {
			x: self.rect.x,
			y: self.rect.y,
			w: self.rect.w,
			h: LINE_H,
		}
	}

	fn body_rect(&self) -> Rect {
		Rect {
			x: self.rect.x,
			y: self.rect.y + LINE_H,
			w: self.rect.w,
			h: (self.rect.h - LINE_H).max(0),
		}
	}
}

#[derive(Debug)]
pub struct Column {
	pub rect: Rect,
	pub windows: Vec<Window>,
}

/// The whole editable model: the row-wide command-line buffer plus columns
/// of windows, and the focus and pointer bookkeeping the actors consult.
#[derive(Debug)]
pub struct EditorState {
	pub rect: Rect,
	/// Row-wide command-line buffer.
	pub tag: Text,
	pub columns: Vec<Column>,
	/// Explicit typing focus; when `None` keys fall through to whatever is
	/// under the last pointer position.
	pub focus: Option<TextId>,
	/// Text that owns an in-progress pointer gesture.
	pub mouse_target: Option<TextId>,
	pub last_pointer: Point,
	next_text: u64,
	next_window: u64,
}

impl EditorState {
	pub fn new(rect: Rect, ncol: usize) -> Self {
		let mut state = Self {
			rect,
			tag: Text::new(TextId(0), TextKind::RowTag, None),
			columns: Vec::new(),
			focus: None,
			mouse_target: None,
			last_pointer: Point::default(),
			next_text: 1,
			next_window: 1,
		};
		for _ in 0..ncol.max(1) {
			state.columns.push(Column {
				rect: Rect::default(),
				windows: Vec::new(),
			});
		}
		state.layout();
		state
	}

	pub fn into_shared(self) -> Shared {
		Arc::new(Mutex::new(self))
	}

	fn alloc_text(&mut self, kind: TextKind, window: Option<WindowId>) -> Text {
		let id = TextId(self.next_text);
		self.next_text += 1;
		Text::new(id, kind, window)
	}

	/// Creates an empty window named `name` in column `col` and lays the
	/// column out again. The window's tag starts as `name` plus a trailing
	/// space so typed commands do not fuse with it.
	pub fn new_window(&mut self, col: usize, name: &str) -> WindowId {
		let id = WindowId(self.next_window);
		self.next_window += 1;

		let mut tag = self.alloc_text(TextKind::Tag, Some(id));
		tag.insert(0, &format!("{name} "));
		tag.commit();
		let body = self.alloc_text(TextKind::Body, Some(id));

		let col = col.min(self.columns.len() - 1);
		self.columns[col].windows.push(Window {
			id,
			name: name.to_string(),
			tag,
			body,
			rect: Rect::default(),
			dirty: true,
			render: Arc::new(Mutex::new(WinRender::default())),
		});
		self.layout_column(col);
		id
	}

	pub fn window(&self, id: WindowId) -> Option<&Window> {
		self.columns.iter().flat_map(|c| c.windows.iter()).find(|w| w.id == id)
	}

	pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
		self.columns
			.iter_mut()
			.flat_map(|c| c.windows.iter_mut())
			.find(|w| w.id == id)
	}

	pub fn text(&self, id: TextId) -> Option<&Text> {
		if self.tag.id() == id {
			return Some(&self.tag);
		}
		self.columns
			.iter()
			.flat_map(|c| c.windows.iter())
			.flat_map(|w| [&w.tag, &w.body])
			.find(|t| t.id() == id)
	}

	pub fn text_mut(&mut self, id: TextId) -> Option<&mut Text> {
		if self.tag.id() == id {
			return Some(&mut self.tag);
		}
		self.columns
			.iter_mut()
			.flat_map(|c| c.windows.iter_mut())
			.flat_map(|w| [&mut w.tag, &mut w.body])
			.find(|t| t.id() == id)
	}

	/// Hit-tests a screen position against the layout.
	pub fn which(&self, p: Point) -> Option<Hit> {
		let row_tag = Rect {
			x: self.rect.x,
			y: self.rect.y,
			w: self.rect.w,
			h: LINE_H,
		};
		if row_tag.contains(p) {
			return Some(Hit {
				text: self.tag.id(),
				window: None,
				zone: Zone::Content,
			});
		}
		for col in &self.columns {
			if !col.rect.contains(p) {
				continue;
			}
			for w in &col.windows {
				if w.tag_rect().contains(p) {
					let zone = if p.x < w.rect.x + GUTTER_W {
						Zone::DragHandle
					} else {
						Zone::Content
					};
					return Some(Hit {
						text: w.tag.id(),
						window: Some(w.id),
						zone,
					});
				}
				if w.body_rect().contains(p) {
					let zone = if p.x < w.rect.x + GUTTER_W {
						Zone::ScrollGutter
					} else {
						Zone::Content
					};
					return Some(Hit {
						text: w.body.id(),
						window: Some(w.id),
						zone,
					});
				}
			}
		}
		None
	}

	/// Maps a screen position inside a text's rect to a char offset on the
	/// monospace grid, clamped to line ends.
	pub fn char_at(&self, id: TextId, p: Point) -> Option<usize> {
		if id == self.tag.id() {
			let col = ((p.x - self.rect.x) / CELL_W).max(0) as usize;
			return Some(col.min(self.tag.len()));
		}
		let w = self
			.columns
			.iter()
			.flat_map(|c| c.windows.iter())
			.find(|w| w.tag.id() == id || w.body.id() == id)?;
		if w.tag.id() == id {
			let col = ((p.x - w.rect.x - GUTTER_W) / CELL_W).max(0) as usize;
			return Some(col.min(w.tag.len()));
		}
		let body = w.body_rect();
		let top = w.render.lock().top_line;
		let line = ((p.y - body.y) / LINE_H).max(0) as usize + top;
		let col = ((p.x - body.x - GUTTER_W) / CELL_W).max(0) as usize;
		let start = w.body.line_start(line);
		Some(start + col.min(w.body.line_len(line)))
	}

	/// Routes one typed character: explicit focus first, otherwise whatever
	/// is under the last pointer position. Returns the text that took it,
	/// `None` when the pointer is over no text.
	pub fn type_char(&mut self, ch: char) -> Option<TextId> {
		let target = match self.focus {
			Some(id) => id,
			None => self.which(self.last_pointer)?.text,
		};
		let mut buf = [0u8; 4];
		let s: &str = ch.encode_utf8(&mut buf);
		match ch {
			'\u{8}' => {
				// Backspace: collapse a selection, else eat one char.
				let t = self.text_mut(target)?;
				let (q0, q1) = t.selection();
				if q0 == q1 {
					if q0 > 0 {
						t.delete(q0 - 1, q0);
						t.set_select(q0 - 1, q0 - 1);
					}
				} else {
					t.delete(q0, q1);
					t.set_select(q0, q0);
				}
			}
			_ => {
				self.text_mut(target)?.replace_selection(s);
			}
		}
		self.focus = Some(target);
		self.mark_dirty(target);
		Some(target)
	}

	/// Commits any pending tag edit on a window, syncing its name to the
	/// first tag token. Returns whether anything was pending.
	pub fn commit_tag(&mut self, id: WindowId) -> bool {
		let Some(w) = self.window_mut(id) else {
			return false;
		};
		if !w.tag.commit() {
			return false;
		}
		let tag = w.tag.content();
		w.name = tag.split_whitespace().next().unwrap_or_default().to_string();
		true
	}

	/// Commits every pending tag edit in the layout. Returns the windows
	/// that had one.
	pub fn commit_all_tags(&mut self) -> Vec<WindowId> {
		let ids: Vec<WindowId> = self
			.columns
			.iter()
			.flat_map(|c| c.windows.iter())
			.filter(|w| w.tag.has_pending())
			.map(|w| w.id)
			.collect();
		for &id in &ids {
			self.commit_tag(id);
		}
		self.tag.commit();
		ids
	}

	pub fn mark_dirty(&mut self, text: TextId) {
		if let Some(w) = self
			.columns
			.iter_mut()
			.flat_map(|c| c.windows.iter_mut())
			.find(|w| w.tag.id() == text || w.body.id() == text)
		{
			w.dirty = true;
		}
	}

	/// Moves a window to the top of its column and lays the column out
	/// again.
	pub fn raise_window(&mut self, id: WindowId) {
		for ci in 0..self.columns.len() {
			if let Some(wi) = self.columns[ci].windows.iter().position(|w| w.id == id) {
				let w = self.columns[ci].windows.remove(wi);
				self.columns[ci].windows.insert(0, w);
				self.layout_column(ci);
				return;
			}
		}
	}

	/// Applies a new outer rect and lays everything out proportionally.
	pub fn resize(&mut self, rect: Rect) {
		self.rect = rect;
		self.layout();
	}

	fn layout(&mut self) {
		let ncol = self.columns.len() as i32;
		let body_y = self.rect.y + LINE_H;
		let body_h = (self.rect.h - LINE_H).max(0);
		for (i, col) in self.columns.iter_mut().enumerate() {
			let x0 = self.rect.x + self.rect.w * i as i32 / ncol;
			let x1 = self.rect.x + self.rect.w * (i as i32 + 1) / ncol;
			col.rect = Rect {
				x: x0,
				y: body_y,
				w: x1 - x0,
				h: body_h,
			};
		}
		for i in 0..self.columns.len() {
			self.layout_column(i);
		}
	}

	fn layout_column(&mut self, col: usize) {
		let Some(col) = self.columns.get_mut(col) else {
			return;
		};
		let n = col.windows.len() as i32;
		if n == 0 {
			return;
		}
		for (i, w) in col.windows.iter_mut().enumerate() {
			let y0 = col.rect.y + col.rect.h * i as i32 / n;
			let y1 = col.rect.y + col.rect.h * (i as i32 + 1) / n;
			w.rect = Rect {
				x: col.rect.x,
				y: y0,
				w: col.rect.w,
				h: y1 - y0,
			};
			w.dirty = true;
		}
	}

	/// One-line-per-window description of the layout, for the crash dump.
	pub fn snapshot(&self) -> String {
		let mut out = String::new();
		out.push_str(&format!("tag: {}\n", self.tag.content()));
		for (ci, col) in self.columns.iter().enumerate() {
			for w in &col.windows {
				out.push_str(&format!(
					"col {ci} win {} name {:?} tag {:?} body {} chars\n",
					w.id.0,
					w.name,
					w.tag.content(),
					w.body.len(),
				));
			}
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn state() -> EditorState {
		EditorState::new(
			Rect {
				x: 0,
				y: 0,
				w: 800,
				h: 600,
			},
			2,
		)
	}

	#[test]
	fn new_window_gets_named_tag_and_layout() {
		let mut s = state();
		let id = s.new_window(0, "/tmp/scratch");
		let w = s.window(id).unwrap();
		assert_eq!(w.name, "/tmp/scratch");
		assert_eq!(w.tag.content(), "/tmp/scratch ");
		assert!(w.rect.w > 0 && w.rect.h > 0);
	}

	#[test]
	fn which_distinguishes_row_tag_handle_gutter_and_content() {
		let mut s = state();
		let id = s.new_window(0, "a");
		let w_rect = s.window(id).unwrap().rect;

		let row = s.which(Point { x: 5, y: 5 }).unwrap();
		assert_eq!(row.text, s.tag.id());
		assert_eq!(row.zone, Zone::Content);

		let handle = s
			.which(Point {
				x: w_rect.x + 2,
				y: w_rect.y + 2,
			})
			.unwrap();
		assert_eq!(handle.zone, Zone::DragHandle);
		assert_eq!(handle.window, Some(id));

		let gutter = s
			.which(Point {
				x: w_rect.x + 2,
				y: w_rect.y + LINE_H + 2,
			})
			.unwrap();
		assert_eq!(gutter.zone, Zone::ScrollGutter);

		let body = s
			.which(Point {
				x: w_rect.x + GUTTER_W + 5,
				y: w_rect.y + LINE_H + 2,
			})
			.unwrap();
		assert_eq!(body.zone, Zone::Content);
		assert_eq!(body.text, s.window(id).unwrap().body.id());
	}

	#[test]
	fn type_char_prefers_focus_then_pointer_position() {
		let mut s = state();
		let id = s.new_window(0, "a");
		let body_id = s.window(id).unwrap().body.id();
		let w_rect = s.window(id).unwrap().rect;

		// No focus, pointer over nothing: key is dropped.
		s.last_pointer = Point { x: -10, y: -10 };
		assert_eq!(s.type_char('x'), None);

		// Pointer over the body routes there and establishes focus.
		s.last_pointer = Point {
			x: w_rect.x + GUTTER_W + 5,
			y: w_rect.y + LINE_H + 2,
		};
		assert_eq!(s.type_char('h'), Some(body_id));
		assert_eq!(s.focus, Some(body_id));

		// Established focus wins even after the pointer moves away.
		s.last_pointer = Point { x: 5, y: 5 };
		assert_eq!(s.type_char('i'), Some(body_id));
		assert_eq!(s.window(id).unwrap().body.content(), "hi");
	}

	#[test]
	fn backspace_collapses_selection_or_eats_one_char() {
		let mut s = state();
		let id = s.new_window(0, "a");
		let body_id = s.window(id).unwrap().body.id();
		s.focus = Some(body_id);
		for ch in "abcd".chars() {
			s.type_char(ch);
		}
		s.text_mut(body_id).unwrap().set_select(1, 3);
		s.type_char('\u{8}');
		assert_eq!(s.window(id).unwrap().body.content(), "ad");
		s.type_char('\u{8}');
		// Caret sat at 1 after the selection delete.
		assert_eq!(s.window(id).unwrap().body.content(), "d");
	}

	#[test]
	fn commit_tag_syncs_window_name() {
		let mut s = state();
		let id = s.new_window(0, "old");
		{
			let w = s.window_mut(id).unwrap();
			let len = w.tag.len();
			w.tag.delete(0, len);
			w.tag.insert(0, "renamed +Errors ");
		}
		assert!(s.commit_tag(id));
		assert_eq!(s.window(id).unwrap().name, "renamed");
		assert!(!s.commit_tag(id));
	}

	#[test]
	fn resize_relayouts_all_columns() {
		let mut s = state();
		let a = s.new_window(0, "a");
		let b = s.new_window(1, "b");
		s.resize(Rect {
			x: 0,
			y: 0,
			w: 400,
			h: 300,
		});
		let wa = s.window(a).unwrap().rect;
		let wb = s.window(b).unwrap().rect;
		assert_eq!(wa.w, 200);
		assert_eq!(wb.x, 200);
		assert!(s.window(a).unwrap().dirty);
	}
}
