//! The per-unit version record and its fan-out.
//!
//! Two locks guard a [`Status`]:
//!
//! - `fields` holds the versions, timestamps and miss counters. Mutators take
//!   it exclusively, accessors shared, and it is always released before any
//!   queue send.
//! - `gate` holds the `deleting` flag together with the queue senders. Every
//!   send checks the flag and enqueues under one shared acquisition, and
//!   [`Status::set_deleting`] takes it exclusively, so once the flag is seen
//!   set no further message is enqueued for this unit.
//!
//! A full queue blocks the sender; consumers are expected to keep up.

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use tracing::warn;

use super::fails::Fails;
use super::message::{AnnounceKind, AnnounceMessage, Cell, DbMessage, ServiceData, StatusSummary};
use crate::core::template::{TemplateVars, render};

/// Current UTC time, RFC 3339 to the second.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Queue senders a status writes into. Owned by the engine; a status only
/// holds clones.
#[derive(Debug, Clone, Default)]
pub struct Channels {
    pub announce: Option<Sender<Vec<u8>>>,
    pub database: Option<Sender<DbMessage>>,
    pub save: Option<Sender<bool>>,
}

#[derive(Debug, Default)]
struct Fields {
    approved_version: String,
    deployed_version: String,
    deployed_version_timestamp: String,
    latest_version: String,
    latest_version_timestamp: String,
    last_queried: String,
    regex_misses_content: u64,
    regex_misses_version: u64,
}

#[derive(Debug, Default)]
struct Gate {
    deleting: bool,
    channels: Channels,
}

/// Produces the unit's web URL template on each read.
#[derive(Clone, Default)]
struct WebUrlTemplate(Option<Arc<dyn Fn() -> String + Send + Sync>>);

impl WebUrlTemplate {
    fn get(&self) -> String {
        self.0.as_ref().map(|resolve| resolve()).unwrap_or_default()
    }
}

impl fmt::Debug for WebUrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "WebUrlTemplate(..)" } else { "WebUrlTemplate(None)" })
    }
}

#[derive(Debug, Default)]
pub struct Status {
    service_id: String,
    web_url: WebUrlTemplate,
    fields: RwLock<Fields>,
    gate: RwLock<Gate>,
    pub fails: Fails,
}

impl Status {
    /// A status for `service_id`. `web_url` may reference `{{ version }}`.
    #[must_use]
    pub fn new(service_id: impl Into<String>, web_url: impl Into<String>) -> Self {
        let web_url = web_url.into();
        if web_url.is_empty() {
            return Self::with_web_url(service_id, String::new);
        }
        Self::with_web_url(service_id, move || web_url.clone())
    }

    /// A status whose web URL template is looked up through `resolve` every
    /// time it is needed, so later edits to the settings show through.
    #[must_use]
    pub fn with_web_url<F>(service_id: impl Into<String>, resolve: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            service_id: service_id.into(),
            web_url: WebUrlTemplate(Some(Arc::new(resolve))),
            ..Self::default()
        }
    }

    /// Size the failure flags and wire the fan-out queues.
    pub fn init<N, W>(&self, notify: N, commands: usize, webhooks: W, channels: Channels)
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
    {
        self.fails.init(notify, commands, webhooks);
        self.gate.write().channels = channels;
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    // ──────────────────── last queried ────────────────────

    #[must_use]
    pub fn last_queried(&self) -> String {
        self.fields.read().last_queried.clone()
    }

    /// Set to `at`, or now when `None`.
    pub fn set_last_queried(&self, at: Option<String>) {
        self.fields.write().last_queried = at.unwrap_or_else(now_rfc3339);
    }

    // ──────────────────── approved ────────────────────

    #[must_use]
    pub fn approved_version(&self) -> String {
        self.fields.read().approved_version.clone()
    }

    /// Record an approval. With `persist`, announce it and write it out.
    pub fn set_approved_version(&self, version: &str, persist: bool) {
        self.fields.write().approved_version = version.to_string();

        if persist {
            self.announce(AnnounceKind::Action);
            self.send_database(DbMessage::update(
                self.service_id.clone(),
                vec![Cell::new("approved_version", version)],
            ));
        }
    }

    // ──────────────────── deployed ────────────────────

    #[must_use]
    pub fn deployed_version(&self) -> String {
        self.fields.read().deployed_version.clone()
    }

    #[must_use]
    pub fn deployed_version_timestamp(&self) -> String {
        self.fields.read().deployed_version_timestamp.clone()
    }

    /// Record a deployment stamped now. An approval of this same version is
    /// consumed. With `persist`, failure flags reset and the pair is written.
    pub fn set_deployed_version(&self, version: &str, persist: bool) {
        let timestamp = {
            let mut fields = self.fields.write();
            fields.deployed_version = version.to_string();
            fields.deployed_version_timestamp = now_rfc3339();
            if fields.approved_version == version {
                fields.approved_version.clear();
            }
            fields.deployed_version_timestamp.clone()
        };

        if persist {
            self.fails.reset();
            self.send_database(DbMessage::update(
                self.service_id.clone(),
                vec![
                    Cell::new("deployed_version", version),
                    Cell::new("deployed_version_timestamp", timestamp),
                ],
            ));
        }
    }

    pub fn set_deployed_version_timestamp(&self, timestamp: &str) {
        self.fields.write().deployed_version_timestamp = timestamp.to_string();
    }

    // ──────────────────── latest ────────────────────

    #[must_use]
    pub fn latest_version(&self) -> String {
        self.fields.read().latest_version.clone()
    }

    #[must_use]
    pub fn latest_version_timestamp(&self) -> String {
        self.fields.read().latest_version_timestamp.clone()
    }

    /// Record a newly observed version, stamped with the poll time
    /// (`last_queried`). With `persist`, failure flags reset and the pair is
    /// written.
    pub fn set_latest_version(&self, version: &str, persist: bool) {
        let timestamp = {
            let mut fields = self.fields.write();
            fields.latest_version = version.to_string();
            fields.latest_version_timestamp = fields.last_queried.clone();
            fields.latest_version_timestamp.clone()
        };

        if persist {
            self.fails.reset();
            self.send_database(DbMessage::update(
                self.service_id.clone(),
                vec![
                    Cell::new("latest_version", version),
                    Cell::new("latest_version_timestamp", timestamp),
                ],
            ));
        }
    }

    pub fn set_latest_version_timestamp(&self, timestamp: &str) {
        self.fields.write().latest_version_timestamp = timestamp.to_string();
    }

    /// Restore one persisted column without fan-out. Unknown columns are
    /// ignored.
    pub fn restore(&self, column: &str, value: &str) {
        let mut fields = self.fields.write();
        let slot = match column {
            "approved_version" => &mut fields.approved_version,
            "deployed_version" => &mut fields.deployed_version,
            "deployed_version_timestamp" => &mut fields.deployed_version_timestamp,
            "latest_version" => &mut fields.latest_version,
            "latest_version_timestamp" => &mut fields.latest_version_timestamp,
            _ => return,
        };
        *slot = value.to_string();
    }

    // ──────────────────── regex misses ────────────────────

    pub fn regex_miss_content(&self) {
        self.fields.write().regex_misses_content += 1;
    }

    #[must_use]
    pub fn regex_misses_content(&self) -> u64 {
        self.fields.read().regex_misses_content
    }

    pub fn regex_miss_version(&self) {
        self.fields.write().regex_misses_version += 1;
    }

    #[must_use]
    pub fn regex_misses_version(&self) -> u64 {
        self.fields.read().regex_misses_version
    }

    pub fn reset_regex_misses(&self) {
        let mut fields = self.fields.write();
        fields.regex_misses_content = 0;
        fields.regex_misses_version = 0;
    }

    // ──────────────────── teardown ────────────────────

    /// One-way: every later send becomes a no-op.
    pub fn set_deleting(&self) {
        self.gate.write().deleting = true;
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.gate.read().deleting
    }

    /// Drop the queue senders so consumers can drain and exit. Later sends
    /// report `false`.
    pub fn detach_channels(&self) {
        self.gate.write().channels = Channels::default();
    }

    // ──────────────────── fan-out ────────────────────

    /// Returns whether the payload was enqueued.
    pub fn send_announce(&self, payload: Vec<u8>) -> bool {
        let gate = self.gate.read();
        if gate.deleting {
            return false;
        }
        gate.channels
            .announce
            .as_ref()
            .is_some_and(|tx| tx.send(payload).is_ok())
    }

    pub fn send_database(&self, message: DbMessage) -> bool {
        let gate = self.gate.read();
        if gate.deleting {
            return false;
        }
        gate.channels
            .database
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    pub fn send_save(&self) -> bool {
        let gate = self.gate.read();
        if gate.deleting {
            return false;
        }
        gate.channels
            .save
            .as_ref()
            .is_some_and(|tx| tx.send(true).is_ok())
    }

    /// Serialise the current summary and send it to live subscribers.
    pub fn announce(&self, kind: AnnounceKind) -> bool {
        let message = AnnounceMessage::version(
            kind,
            ServiceData {
                id: self.service_id.clone(),
                web_url: self.web_url(),
                status: self.summary(),
            },
        );
        match message.to_bytes() {
            Ok(payload) => self.send_announce(payload),
            Err(err) => {
                warn!(service = %self.service_id, error = %err, "announce serialization failed");
                false
            }
        }
    }

    // ──────────────────── views ────────────────────

    /// The web URL with `{{ version }}` set to the latest version. Empty when
    /// no URL is configured.
    #[must_use]
    pub fn web_url(&self) -> String {
        let template = self.web_url.get();
        if template.is_empty() {
            return String::new();
        }
        let latest = self.latest_version();
        render(
            &template,
            &TemplateVars {
                service_id: &self.service_id,
                version: &latest,
                web_url: "",
            },
        )
    }

    #[must_use]
    pub fn summary(&self) -> StatusSummary {
        let fields = self.fields.read();
        StatusSummary {
            approved_version: fields.approved_version.clone(),
            deployed_version: fields.deployed_version.clone(),
            deployed_version_timestamp: fields.deployed_version_timestamp.clone(),
            latest_version: fields.latest_version.clone(),
            latest_version_timestamp: fields.latest_version_timestamp.clone(),
            last_queried: fields.last_queried.clone(),
            regex_misses_content: fields.regex_misses_content,
            regex_misses_version: fields.regex_misses_version,
            fails: self.fails.snapshot(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        {
            let fields = self.fields.read();
            let strings = [
                ("approved_version", &fields.approved_version),
                ("deployed_version", &fields.deployed_version),
                ("deployed_version_timestamp", &fields.deployed_version_timestamp),
                ("latest_version", &fields.latest_version),
                ("latest_version_timestamp", &fields.latest_version_timestamp),
                ("last_queried", &fields.last_queried),
            ];
            for (name, value) in strings {
                if !value.is_empty() {
                    parts.push(format!("{name}: {value}"));
                }
            }
            for (name, value) in [
                ("regex_misses_content", fields.regex_misses_content),
                ("regex_misses_version", fields.regex_misses_version),
            ] {
                if value != 0 {
                    parts.push(format!("{name}: {value}"));
                }
            }
        }
        let fails = self.fails.to_string();
        if !fails.is_empty() {
            parts.push(format!("fails: {{{fails}}}"));
        }
        f.write_str(&parts.join(", "))
    }
}
