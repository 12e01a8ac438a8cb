//! Process-wide tracing subscriber setup. Only the binary calls [`init`];
//! library code just emits `tracing` events.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Env var that overrides the configured filter directive.
pub const LOG_ENV: &str = "RWATCH_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `info` or `warn,release_watcher=debug`.
    pub level: String,
    /// Emit one JSON object per event.
    pub json: bool,
    pub timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            timestamps: true,
        }
    }
}

/// Build the filter: `RWATCH_LOG` wins, then the configured level, then `info`.
#[must_use]
pub fn filter_for(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns `false` when one was already set.
pub fn init(settings: &LoggingSettings) -> bool {
    let filter = filter_for(settings);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let installed = match (settings.json, settings.timestamps) {
        (true, true) => builder.json().try_init(),
        (true, false) => builder.json().without_time().try_init(),
        (false, true) => builder.try_init(),
        (false, false) => builder.without_time().try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_human_readable_info() {
        let settings = LoggingSettings::default();
        assert_eq!(settings.level, "info");
        assert!(!settings.json);
        assert!(settings.timestamps);
    }

    #[test]
    fn bad_directive_falls_back_to_info() {
        let settings = LoggingSettings {
            level: "watcher=notalevel".to_string(),
            ..LoggingSettings::default()
        };
        // Only meaningful when the env override is absent.
        if std::env::var_os(LOG_ENV).is_none() {
            assert_eq!(filter_for(&settings).to_string(), "info");
        }
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        let settings = LoggingSettings::default();
        let _ = init(&settings);
        assert!(!init(&settings));
    }
}
