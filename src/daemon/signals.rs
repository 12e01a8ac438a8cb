//! SIGINT / SIGTERM as a shutdown request.

use std::thread;

use crossbeam_channel::{Receiver, bounded};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

use crate::core::errors::{Result, RwError};

/// Listen for the first SIGINT or SIGTERM. The returned receiver yields the
/// signal number once.
pub fn shutdown_requests() -> Result<Receiver<i32>> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|err| RwError::Runtime {
        details: format!("failed to install signal handlers: {err}"),
    })?;
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("rwatch-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "shutdown requested");
                let _ = tx.send(signal);
            }
        })
        .map_err(|err| RwError::Runtime {
            details: format!("failed to spawn signal thread: {err}"),
        })?;
    Ok(rx)
}
