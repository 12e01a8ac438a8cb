//! Live-subscriber fan-out. The engine drains the announce queue into an
//! [`AnnounceSink`] on its own thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::errors::{Result, RwError};

pub trait AnnounceSink: Send + Sync {
    fn deliver(&self, payload: &[u8]);
}

/// Logs payload sizes at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnnounceSink;

impl AnnounceSink for LogAnnounceSink {
    fn deliver(&self, payload: &[u8]) {
        debug!(bytes = payload.len(), "announce");
    }
}

/// Keeps every payload. Handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAnnounceSink {
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl MemoryAnnounceSink {
    #[must_use]
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.lock().is_empty()
    }
}

impl AnnounceSink for MemoryAnnounceSink {
    fn deliver(&self, payload: &[u8]) {
        self.payloads.lock().push(payload.to_vec());
    }
}

/// Drain `rx` into `sink` until every sender is gone.
pub fn spawn(rx: Receiver<Vec<u8>>, sink: Arc<dyn AnnounceSink>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("rwatch-announce".to_string())
        .spawn(move || {
            for payload in rx {
                sink.deliver(&payload);
            }
            debug!("announce queue closed");
        })
        .map_err(|err| RwError::Runtime {
            details: format!("failed to spawn announce thread: {err}"),
        })
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn drains_until_senders_drop() {
        let sink = Arc::new(MemoryAnnounceSink::default());
        let (tx, rx) = bounded(4);
        let handle = spawn(rx, sink.clone()).unwrap();
        tx.send(b"{}".to_vec()).unwrap();
        tx.send(b"[]".to_vec()).unwrap();
        drop(tx);
        handle.join().unwrap();
        assert_eq!(sink.payloads(), vec![b"{}".to_vec(), b"[]".to_vec()]);
    }
}
