//! Daemon subsystem: poll loop, actions, queue consumers and signal handling.

pub mod actions;
pub mod announce;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod engine;
pub mod poll;
pub mod save;
#[cfg(feature = "daemon")]
pub mod signals;

pub use actions::{ActionReport, ActionResult, Collaborators};
pub use engine::{Engine, Sinks};
pub use poll::{PollMode, PollOutcome};
