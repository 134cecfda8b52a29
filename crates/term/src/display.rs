//! Plain-terminal rendering surface.
//!
//! Paints the model as text: the command line first, then one block per
//! window. Good enough to drive the coordination core from a terminal; a
//! richer surface plugs in behind the same [`Display`] trait.

use std::io::Write;

use parking_lot::Mutex;

use scriv_editor::redraw::Display;
use scriv_editor::state::{EditorState, Rect};

pub struct TermDisplay {
	geometry: Mutex<Rect>,
	out: Mutex<Box<dyn Write + Send>>,
}

impl TermDisplay {
	pub fn new(geometry: Rect, out: Box<dyn Write + Send>) -> Self {
		Self {
			geometry: Mutex::new(geometry),
			out: Mutex::new(out),
		}
	}

	pub fn stdout(geometry: Rect) -> Self {
		Self::new(geometry, Box::new(std::io::stdout()))
	}

	/// Records a new outer geometry; the pointer actor re-queries it on the
	/// next resize event.
	pub fn set_geometry(&self, rect: Rect) {
		*self.geometry.lock() = rect;
	}

	fn paint(&self, state: &EditorState, out: &mut dyn Write) -> std::io::Result<()> {
		writeln!(out, "== {}", state.tag.content())?;
		for col in &state.columns {
			for w in &col.windows {
				let (q0, q1) = w.body.selection();
				writeln!(out, "-- [{}] {} ({}..{})", w.id.0, w.tag.content(), q0, q1)?;
				let top = w.render.lock().top_line;
				for line in w.body.content().lines().skip(top) {
					writeln!(out, "   {line}")?;
				}
			}
		}
		out.flush()
	}
}

impl Display for TermDisplay {
	fn geometry(&self) -> Rect {
		*self.geometry.lock()
	}

	fn flush(&self, state: &EditorState) {
		let mut out = self.out.lock();
		if let Err(err) = self.paint(state, out.as_mut()) {
			tracing::warn!(error = %err, "display.paint_failed");
		}
	}
}
