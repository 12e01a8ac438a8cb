//! Shared building blocks: errors, configuration, override resolution,
//! validation reports and counters.

pub mod config;
pub mod curl;
pub mod defaults;
pub mod errors;
pub mod hard_defaults;
pub mod metrics;
pub mod template;
pub mod validation;
