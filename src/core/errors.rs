//! RW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, RwError>;

/// Top-level error type for the release watcher.
#[derive(Debug, Error)]
pub enum RwError {
    #[error("[RW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[RW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[RW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[RW-1004] configuration failed validation:\n{report}")]
    Validation { report: String },

    #[error("[RW-1101] unknown service: {service_id}")]
    UnknownService { service_id: String },

    #[error("[RW-1102] {service_id}: {requested} is not the latest version ({latest})")]
    StaleVersion {
        service_id: String,
        requested: String,
        latest: String,
    },

    #[error("[RW-2001] version source failure for {service_id}: {details}")]
    Source {
        service_id: String,
        details: String,
    },

    #[error("[RW-2002] delivery to {target} failed: {details}")]
    Delivery { target: String, details: String },

    #[error("[RW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[RW-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[RW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[RW-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[RW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl RwError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "RW-1001",
            Self::MissingConfig { .. } => "RW-1002",
            Self::ConfigParse { .. } => "RW-1003",
            Self::Validation { .. } => "RW-1004",
            Self::UnknownService { .. } => "RW-1101",
            Self::StaleVersion { .. } => "RW-1102",
            Self::Source { .. } => "RW-2001",
            Self::Delivery { .. } => "RW-2002",
            Self::Serialization { .. } => "RW-2101",
            Self::Sql { .. } => "RW-2102",
            Self::Io { .. } => "RW-3002",
            Self::ChannelClosed { .. } => "RW-3003",
            Self::Runtime { .. } => "RW-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Source { .. }
                | Self::Delivery { .. }
                | Self::ChannelClosed { .. }
                | Self::Sql { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for version source failures.
    #[must_use]
    pub fn source(service_id: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Source {
            service_id: service_id.into(),
            details: details.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for RwError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for RwError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for RwError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for RwError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<regex::Error> for RwError {
    fn from(value: regex::Error) -> Self {
        Self::InvalidConfig {
            details: value.to_string(),
        }
    }
}
