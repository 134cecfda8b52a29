//! Worker runtime primitives shared by the scriv dispatch actors.
//!
//! Every long-lived loop in the editor is a tokio task that blocks on a
//! multiplexed receive over its own queues. This crate provides the pieces
//! those loops share: class-tagged spawning, a bounded mailbox with overflow
//! policies, and a monotonic generation clock.

mod class;
mod mailbox;
mod spawn;
mod token;

pub use class::TaskClass;
pub use mailbox::{Mailbox, MailboxPolicy, MailboxReceiver, MailboxSendError, MailboxSendOutcome, MailboxSender};
pub use spawn::{spawn, spawn_blocking};
pub use token::GenerationClock;
