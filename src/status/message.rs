//! Payloads a [`Status`](super::Status) hands to its fan-out queues.

use serde::{Deserialize, Serialize};

use super::fails::FailsSnapshot;
use crate::core::errors::Result;

/// Status columns persisted per unit.
pub const COLUMNS: &[&str] = &[
    "approved_version",
    "deployed_version",
    "deployed_version_timestamp",
    "latest_version",
    "latest_version_timestamp",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub column: String,
    pub value: String,
}

impl Cell {
    #[must_use]
    pub fn new(column: &str, value: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }
}

/// One change record for the persistence consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbMessage {
    pub service_id: String,
    pub cells: Vec<Cell>,
    /// Drop every row of the unit instead of writing `cells`.
    #[serde(default)]
    pub delete: bool,
}

impl DbMessage {
    #[must_use]
    pub fn update(service_id: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            service_id: service_id.into(),
            cells,
            delete: false,
        }
    }

    #[must_use]
    pub fn delete(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            cells: Vec::new(),
            delete: true,
        }
    }
}

/// Point-in-time copy of a unit's status, as shown to live subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub approved_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deployed_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deployed_version_timestamp: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latest_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latest_version_timestamp: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_queried: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub regex_misses_content: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub regex_misses_version: u64,
    pub fails: FailsSnapshot,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Announcement flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnounceKind {
    /// The unit was polled.
    Query,
    /// A new latest version was found.
    New,
    /// Approval or action outcome changed.
    Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceData {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub web_url: String,
    pub status: StatusSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnounceMessage {
    pub page: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sub_type: AnnounceKind,
    pub service_data: ServiceData,
}

impl AnnounceMessage {
    #[must_use]
    pub const fn version(sub_type: AnnounceKind, service_data: ServiceData) -> Self {
        Self {
            page: "APPROVALS",
            kind: "VERSION",
            sub_type,
            service_data,
        }
    }

    /// Serialise for the live-subscriber queue.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
