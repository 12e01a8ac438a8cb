//! `rwatch daemon`: run the watcher in the foreground until signalled.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::core::config::ConfigFile;
use crate::core::errors::Result;
use crate::daemon::announce::LogAnnounceSink;
use crate::daemon::save::FileConfigSink;
use crate::daemon::signals::shutdown_requests;
use crate::daemon::{Collaborators, Engine, Sinks};
use crate::logger;

pub fn run_daemon(path: &Path) -> Result<()> {
    let config = ConfigFile::load(path)?;
    logger::init(&config.settings.log);
    info!(path = %path.display(), units = config.service.len(), "starting");

    let config = Arc::new(RwLock::new(config));
    let sinks = Sinks {
        announce: Arc::new(LogAnnounceSink),
        config: Some(Arc::new(FileConfigSink::new(
            path.to_path_buf(),
            Arc::clone(&config),
        ))),
    };
    let engine = Engine::new(config, Collaborators::default(), sinks)?;
    if !engine.report().is_empty() {
        warn!("invalid units were left out:\n{}", engine.report());
    }
    let stop = shutdown_requests()?;
    engine.run_until(&stop)?;
    info!("stopped");
    Ok(())
}
