//! The running watcher: unit table, poll threads and queue consumers.
//!
//! Each active unit gets one thread that polls, then sleeps its resolved
//! interval. The sleep is a receive on the unit's stop queue, so stopping a
//! unit wakes it at once. Consumers (database, save, announce) run on their
//! own threads and exit when the last sender is dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tracing::{debug, info, warn};

use super::actions::{self, ActionReport, Collaborators};
use super::announce::{self, AnnounceSink, LogAnnounceSink};
use super::poll::{PollMode, PollOutcome, poll};
use super::save::{ConfigSink, SaveHandler};
use crate::core::config::{ConfigFile, parse_duration};
use crate::core::errors::{Result, RwError};
use crate::core::metrics::Metrics;
use crate::core::validation::ValidationReport;
use crate::service::{Catalog, Service};
use crate::status::{Channels, DbMessage};

/// Upper bound of the random delay before a unit's first poll.
const MAX_START_JITTER: Duration = Duration::from_secs(1);
const FALLBACK_DEBOUNCE: Duration = Duration::from_secs(5);

/// Where the engine's queues drain to.
pub struct Sinks {
    pub announce: Arc<dyn AnnounceSink>,
    /// Receives debounced save pulses. No saving when `None`.
    pub config: Option<Arc<dyn ConfigSink>>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            announce: Arc::new(LogAnnounceSink),
            config: None,
        }
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Engine {
    config: Arc<RwLock<ConfigFile>>,
    services: RwLock<BTreeMap<String, Arc<Service>>>,
    collab: Arc<Collaborators>,
    metrics: Arc<Metrics>,
    channels: Mutex<Channels>,
    workers: Mutex<BTreeMap<String, Worker>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    report: ValidationReport,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("services", &self.services.read().len())
            .field("workers", &self.workers.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "sqlite")]
fn open_database(
    config: &ConfigFile,
    capacity: usize,
    channels: &mut Channels,
    consumers: &mut Vec<JoinHandle<()>>,
) -> Result<BTreeMap<String, Vec<crate::status::Cell>>> {
    use super::database::DatabaseWriter;

    let Some(path) = &config.settings.database_file else {
        return Ok(BTreeMap::new());
    };
    let writer = DatabaseWriter::open(path)?;
    let restored = writer.load_statuses()?;
    let (tx, rx) = bounded(capacity);
    consumers.push(writer.spawn(rx)?);
    channels.database = Some(tx);
    info!(path = %path.display(), units = restored.len(), "status database opened");
    Ok(restored)
}

#[cfg(not(feature = "sqlite"))]
fn open_database(
    config: &ConfigFile,
    _capacity: usize,
    _channels: &mut Channels,
    _consumers: &mut Vec<JoinHandle<()>>,
) -> Result<BTreeMap<String, Vec<crate::status::Cell>>> {
    if config.settings.database_file.is_some() {
        warn!("database_file is set but this build has no sqlite support");
    }
    Ok(BTreeMap::new())
}

impl Engine {
    /// Build every unit, start the queue consumers and restore persisted
    /// status. Units that fail validation are left out; see [`Self::report`].
    pub fn new(
        config: Arc<RwLock<ConfigFile>>,
        collab: Collaborators,
        sinks: Sinks,
    ) -> Result<Self> {
        let snapshot = config.read().clone();
        let capacity = snapshot.settings.channel_capacity.max(1);
        let mut channels = Channels::default();
        let mut consumers = Vec::new();

        let (announce_tx, announce_rx) = bounded(capacity);
        consumers.push(announce::spawn(announce_rx, sinks.announce)?);
        channels.announce = Some(announce_tx);

        if let Some(sink) = sinks.config {
            let debounce = parse_duration(&snapshot.settings.save_debounce).unwrap_or(FALLBACK_DEBOUNCE);
            let (save_tx, save_rx) = bounded(capacity);
            consumers.push(SaveHandler::spawn(save_rx, debounce, sink)?);
            channels.save = Some(save_tx);
        }

        let restored = open_database(&snapshot, capacity, &mut channels, &mut consumers)?;

        let metrics = Arc::new(Metrics::new());
        let catalog = Catalog::build(&snapshot, &channels, Some(&metrics));
        for (id, cells) in &restored {
            if let Some(service) = catalog.get(id) {
                for cell in cells {
                    service.status.restore(&cell.column, &cell.value);
                }
            }
        }
        if !catalog.report.is_empty() {
            warn!(excluded = catalog.excluded.len(), "some units failed validation");
        }

        Ok(Self {
            config,
            services: RwLock::new(catalog.services),
            collab: Arc::new(collab),
            metrics,
            channels: Mutex::new(channels),
            workers: Mutex::new(BTreeMap::new()),
            consumers: Mutex::new(consumers),
            report: catalog.report,
        })
    }

    /// Problems found while building the units.
    #[must_use]
    pub const fn report(&self) -> &ValidationReport {
        &self.report
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Service>> {
        self.services.read().get(id).cloned()
    }

    fn service(&self, id: &str) -> Result<Arc<Service>> {
        self.get(id).ok_or_else(|| RwError::UnknownService {
            service_id: id.to_string(),
        })
    }

    /// Spawn a poll thread for every active unit that doesn't have one.
    pub fn start(&self) -> Result<usize> {
        let services: Vec<Arc<Service>> = self.services.read().values().cloned().collect();
        let mut workers = self.workers.lock();
        let mut started = 0;
        for service in services {
            if workers.contains_key(&service.id) {
                continue;
            }
            if !service.settings.active() {
                debug!(service = %service.id, "inactive, not scheduled");
                continue;
            }
            let id = service.id.clone();
            workers.insert(id, spawn_worker(service, Arc::clone(&self.collab))?);
            started += 1;
        }
        info!(started, "poll threads running");
        Ok(started)
    }

    /// Poll `id` now. Returns [`PollOutcome::Busy`] when its thread is
    /// mid-poll.
    pub fn refresh_now(&self, id: &str) -> Result<PollOutcome> {
        let service = self.service(id)?;
        Ok(poll(&service, &self.collab, PollMode::Live))
    }

    pub fn approve(&self, id: &str, version: &str) -> Result<ActionReport> {
        let service = self.service(id)?;
        actions::approve(&service, &self.collab, version)
    }

    pub fn skip(&self, id: &str, version: &str) -> Result<()> {
        let service = self.service(id)?;
        actions::skip(&service, version)
    }

    pub fn retry_failed(&self, id: &str) -> Result<ActionReport> {
        let service = self.service(id)?;
        Ok(actions::retry_failed(&service, &self.collab))
    }

    /// Take `id` out of service: silence its status, stop its thread, drop
    /// its counters and persisted rows, and save the config without it.
    pub fn remove(&self, id: &str) -> Result<()> {
        let service = self
            .services
            .write()
            .remove(id)
            .ok_or_else(|| RwError::UnknownService {
                service_id: id.to_string(),
            })?;
        service.status.set_deleting();
        if let Some(worker) = self.workers.lock().remove(id) {
            stop_worker(id, worker);
        }
        service.remove_metrics();
        service.status.detach_channels();

        self.config.write().service.remove(id);
        let channels = self.channels.lock().clone();
        if let Some(tx) = &channels.database {
            let _ = tx.send(DbMessage::delete(id));
        }
        if let Some(tx) = &channels.save {
            let _ = tx.send(true);
        }
        info!(service = %id, "removed");
        Ok(())
    }

    /// Stop every poll thread, then close the queues and wait for the
    /// consumers to drain. Safe to call more than once.
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for (id, worker) in workers {
            stop_worker(&id, worker);
        }
        for service in self.services.read().values() {
            service.status.detach_channels();
        }
        *self.channels.lock() = Channels::default();
        let consumers = std::mem::take(&mut *self.consumers.lock());
        for handle in consumers {
            if handle.join().is_err() {
                warn!("a consumer thread panicked");
            }
        }
        debug!("engine stopped");
    }

    /// Run until `stop` yields or closes, then shut down.
    pub fn run_until(&self, stop: &Receiver<i32>) -> Result<()> {
        self.start()?;
        let _ = stop.recv();
        self.shutdown();
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(service: Arc<Service>, collab: Arc<Collaborators>) -> Result<Worker> {
    let (stop, stop_rx) = bounded::<()>(1);
    let name = format!("rwatch-poll-{}", service.id);
    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || run_worker(&service, &collab, &stop_rx))
        .map_err(|err| RwError::Runtime {
            details: format!("failed to spawn poll thread: {err}"),
        })?;
    Ok(Worker { stop, handle })
}

/// `true` when the worker should exit.
fn wait(stop: &Receiver<()>, timeout: Duration) -> bool {
    !matches!(stop.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
}

fn run_worker(service: &Service, collab: &Collaborators, stop: &Receiver<()>) {
    let jitter_ms = rand::rng().random_range(0..=MAX_START_JITTER.as_millis());
    let jitter = Duration::from_millis(u64::try_from(jitter_ms).unwrap_or(0));
    if wait(stop, jitter.min(service.settings.interval())) {
        return;
    }
    loop {
        let outcome = poll(service, collab, PollMode::Live);
        debug!(service = %service.id, ?outcome, "poll finished");
        if wait(stop, service.settings.interval()) {
            break;
        }
    }
    debug!(service = %service.id, "poll thread exiting");
}

fn stop_worker(id: &str, worker: Worker) {
    drop(worker.stop);
    if worker.handle.join().is_err() {
        warn!(service = %id, "poll thread panicked");
    }
}
