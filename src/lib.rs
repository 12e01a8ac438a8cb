//! Release Watcher: watches upstream release sources and reacts to new
//! versions.
//!
//! Each configured unit (a "service") polls a latest-version source on its
//! own interval, runs the fetched text through a filter pipeline and
//! compares the result with what it saw before. A newer version fans out to
//! notifiers, deploy commands and webhooks, optionally behind an approval.
//! Unit status is persisted to SQLite and announced to subscribers.

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
pub mod daemon;
pub mod filter;
pub mod logger;
pub mod notify;
pub mod service;
pub mod source;
pub mod status;
