//! Version extraction: URL command pipelines and requirement checks.

pub mod require;
pub mod url_command;

pub use require::{Require, RequireMiss, RequireSpec};
pub use url_command::{FilterMiss, MissKind, Pipeline, UrlCommand, UrlCommandSpec};
