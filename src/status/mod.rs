//! Per-unit state: versions, failure flags and the fan-out payloads.

pub mod fails;
pub mod message;
#[allow(clippy::module_inception)]
pub mod status;

pub use fails::{FailList, FailMap, FailState, Fails, FailsSnapshot};
pub use message::{AnnounceKind, AnnounceMessage, COLUMNS, Cell, DbMessage, StatusSummary};
pub use status::{Channels, Status, now_rfc3339};
