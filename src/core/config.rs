//! Configuration document: TOML tables, layer types and load helpers.
//!
//! Everything here is plain data. Layers (notify, webhook, service defaults)
//! are the partially-specified records that take part in override chains;
//! turning the document into runnable units happens in
//! [`crate::service::catalog`].

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{Layer, lowercase_keys};
use super::errors::{Result, RwError};
use crate::filter::{RequireSpec, UrlCommandSpec};
use crate::logger::LoggingSettings;

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "RWATCH_CONFIG";
/// Used when neither `--config` nor the env var is given.
pub const DEFAULT_CONFIG_PATH: &str = "rwatch.toml";
/// Default bound of the database / save / announce queues.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

// ──────────────────── document ────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub settings: Settings,
    pub defaults: DefaultsSection,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub notify: BTreeMap<String, NotifyLayer>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub webhook: BTreeMap<String, WebHookLayer>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub service: BTreeMap<String, ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LoggingSettings,
    /// SQLite file for persisted status. No persistence when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_file: Option<PathBuf>,
    pub channel_capacity: usize,
    /// Quiet period before a save pulse rewrites the config file.
    pub save_debounce: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LoggingSettings::default(),
            database_file: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            save_debounce: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub service: ServiceLayer,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub notify: BTreeMap<String, NotifyLayer>,
    pub webhook: WebHookLayer,
}

// ──────────────────── layers ────────────────────

/// A notifier: delivery type plus free-form option maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyLayer {
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Delivery behaviour: `delay`, `max_tries`, `message`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Endpoint pieces: `url`, `token`, `host`, ...
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub url_fields: BTreeMap<String, String>,
    /// Per-type parameters: `title`, `color`, ...
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl Layer for NotifyLayer {
    fn declared_type(&self) -> &str {
        &self.kind
    }

    fn clear_type(&mut self) {
        self.kind.clear();
    }

    fn normalize(&mut self) {
        lowercase_keys(&mut self.options);
        lowercase_keys(&mut self.url_fields);
        lowercase_keys(&mut self.params);
    }
}

/// A webhook: an HTTP POST announcing the new version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebHookLayer {
    /// Payload flavour: `github` or `gitlab`.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub secret: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_invalid_certs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_status_code: Option<u16>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub delay: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent_fails: Option<bool>,
}

impl Layer for WebHookLayer {
    fn declared_type(&self) -> &str {
        &self.kind
    }

    fn clear_type(&mut self) {
        self.kind.clear();
    }

    fn normalize(&mut self) {
        lowercase_keys(&mut self.custom_headers);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsLayer {
    /// Poll interval, `AhBmCs` form.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_versioning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Log filter misses quietly. They are still counted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_misses: Option<bool>,
}

/// Lookup settings that may be inherited from the service defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupOverrides {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_invalid_certs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_prerelease: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approve: Option<bool>,
    /// Link shown for the unit. `{{ version }}` expands to the latest version.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub web_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,
}

/// The service-level layer: `[defaults.service]` and each unit's own values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLayer {
    pub options: OptionsLayer,
    pub latest_version: LookupOverrides,
    pub dashboard: DashboardLayer,
}

impl Layer for ServiceLayer {
    fn declared_type(&self) -> &str {
        ""
    }

    fn clear_type(&mut self) {}
}

// ──────────────────── units ────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatestVersionConfig {
    /// `github` or `url`.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub url_commands: Vec<UrlCommandSpec>,
    pub require: RequireSpec,
    #[serde(flatten)]
    pub overrides: LookupOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub options: OptionsLayer,
    pub latest_version: LatestVersionConfig,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub notify: BTreeMap<String, NotifyLayer>,
    /// Each command is `[program, args...]`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub webhook: BTreeMap<String, WebHookLayer>,
    pub dashboard: DashboardLayer,
}

impl ServiceConfig {
    /// The unit's own service-level layer.
    #[must_use]
    pub fn layer(&self) -> ServiceLayer {
        ServiceLayer {
            options: self.options.clone(),
            latest_version: self.latest_version.overrides.clone(),
            dashboard: self.dashboard.clone(),
        }
    }
}

// ──────────────────── loading ────────────────────

impl ConfigFile {
    /// Pick the config path: explicit flag, then `RWATCH_CONFIG`, then the
    /// default file name.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(
            || {
                std::env::var_os(CONFIG_ENV)
                    .filter(|v| !v.is_empty())
                    .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
            },
            Path::to_path_buf,
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(RwError::MissingConfig {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(RwError::io(path, err)),
        };
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Atomically rewrite `path` with the current document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = self.to_toml_string()?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, rendered).map_err(|err| RwError::io(&tmp, err))?;
        std::fs::rename(&tmp, path).map_err(|err| RwError::io(path, err))
    }
}

/// Parse `AhBmCs` durations (`1h30m`, `10m`, `45s`) or bare seconds.
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let mut total = 0_u64;
    let mut digits = String::new();
    let mut last_unit = 0_u8;
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let (rank, scale) = match ch {
            'h' => (1, 3600),
            'm' => (2, 60),
            's' => (3, 1),
            _ => return None,
        };
        if digits.is_empty() || rank <= last_unit {
            return None;
        }
        total = total.checked_add(digits.parse::<u64>().ok()?.checked_mul(scale)?)?;
        digits.clear();
        last_unit = rank;
    }
    if digits.is_empty() {
        Some(Duration::from_secs(total))
    } else {
        None
    }
}
