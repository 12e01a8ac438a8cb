//! Debounced config saves.
//!
//! Save pulses arrive on a queue. After the first pulse the handler waits
//! for a quiet period, absorbing any further pulses, then saves once.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::core::config::ConfigFile;
use crate::core::errors::{Result, RwError};

pub trait ConfigSink: Send + Sync {
    fn save(&self) -> Result<()>;
}

/// Writes the shared document back to its file.
#[derive(Debug, Clone)]
pub struct FileConfigSink {
    path: PathBuf,
    config: Arc<RwLock<ConfigFile>>,
}

impl FileConfigSink {
    #[must_use]
    pub const fn new(path: PathBuf, config: Arc<RwLock<ConfigFile>>) -> Self {
        Self { path, config }
    }
}

impl ConfigSink for FileConfigSink {
    fn save(&self) -> Result<()> {
        self.config.read().save(&self.path)?;
        info!(path = %self.path.display(), "config saved");
        Ok(())
    }
}

/// Wait for the next pulse, then for `debounce` of silence. Returns whether
/// a save is due and whether the queue is still open.
fn next_batch(rx: &Receiver<bool>, debounce: Duration) -> (bool, bool) {
    if rx.recv().is_err() {
        return (false, false);
    }
    loop {
        match rx.recv_timeout(debounce) {
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => return (true, true),
            Err(RecvTimeoutError::Disconnected) => return (true, false),
        }
    }
}

#[derive(Debug)]
pub struct SaveHandler;

impl SaveHandler {
    /// Run the debounce loop on its own thread until every sender is gone.
    /// A pending save is still flushed on the way out.
    pub fn spawn(
        rx: Receiver<bool>,
        debounce: Duration,
        sink: Arc<dyn ConfigSink>,
    ) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("rwatch-save".to_string())
            .spawn(move || {
                loop {
                    let (due, open) = next_batch(&rx, debounce);
                    if due {
                        if let Err(err) = sink.save() {
                            error!(error = %err, code = err.code(), "config save failed");
                        }
                    }
                    if !open {
                        break;
                    }
                }
                debug!("save queue closed");
            })
            .map_err(|err| RwError::Runtime {
                details: format!("failed to spawn save thread: {err}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crossbeam_channel::bounded;

    use super::*;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl ConfigSink for Counting {
        fn save(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn burst_of_pulses_saves_once() {
        let sink = Arc::new(Counting::default());
        let (tx, rx) = bounded(8);
        let handle = SaveHandler::spawn(rx, Duration::from_millis(50), sink.clone()).unwrap();
        for _ in 0..5 {
            tx.send(true).unwrap();
        }
        thread::sleep(Duration::from_millis(300));
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
        drop(tx);
        handle.join().unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pending_save_is_flushed_on_close() {
        let sink = Arc::new(Counting::default());
        let (tx, rx) = bounded(8);
        let handle = SaveHandler::spawn(rx, Duration::from_secs(60), sink.clone()).unwrap();
        tx.send(true).unwrap();
        drop(tx);
        handle.join().unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_sink_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rwatch.toml");
        let config = Arc::new(RwLock::new(ConfigFile::default()));
        FileConfigSink::new(path.clone(), config).save().unwrap();
        assert!(ConfigFile::load(&path).is_ok());
    }
}
