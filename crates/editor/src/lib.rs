//! Coordination core of the scriv editor.
//!
//! Everything here exists to serialize access to one shared editable model
//! from several independently-scheduled event sources. Each concern runs as
//! one long-lived dispatch actor: a tokio task that blocks on a multiplexed
//! receive over its own queues, reacts to exactly one event, and loops.
//! Actors never call each other; they either post a message onto another
//! actor's queue or mutate [`state::EditorState`] under its coarse lock.
//!
//! The rendering surface, the OS window driver and the file server are
//! external collaborators consumed through narrow interfaces ([`redraw`],
//! [`fid`]); this crate owns only the coordination between them.

pub mod clipboard;
pub mod config;
pub mod exec;
pub mod fid;
pub mod keyboard;
pub mod newwindow;
pub mod pointer;
pub mod redraw;
pub mod sel;
pub mod state;
pub mod warn;

pub use redraw::{Display, RedrawHandle};
pub use state::{EditorState, Shared, TextId, WindowId};
pub use warn::Warn;
