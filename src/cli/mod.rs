//! Subcommand implementations behind [`crate::cli_app`].

pub mod check;
pub mod daemon;
pub mod filter;
pub mod once;
pub mod report;
