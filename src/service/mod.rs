//! Watched units: one release stream each, with the actions to fire when it
//! moves.
//!
//! A [`Service`] is built by [`catalog::Catalog::build`] from the unit's table
//! in the config file. Settings are resolved lazily through the override
//! chains, so editing a defaults template is seen on the next read.

pub mod catalog;
pub mod lookup;
pub mod options;
pub mod version;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::core::config::ServiceConfig;
use crate::core::metrics::{COMMAND_RESULT, LATEST_VERSION_QUERY, Metrics, Outcome};
use crate::core::validation::ValidationReport;
use crate::notify::command::display_argv;
use crate::notify::{Notify, WebHook};
use crate::status::Status;

pub use catalog::Catalog;
pub use lookup::LatestVersionLookup;
pub use options::ServiceSettings;
pub use version::Newness;

#[derive(Debug)]
pub struct Service {
    pub id: String,
    pub settings: ServiceSettings,
    pub lookup: LatestVersionLookup,
    pub notify: Vec<Notify>,
    pub command: Vec<Vec<String>>,
    pub webhook: Vec<WebHook>,
    pub status: Status,
    /// The unit's table as loaded, written back on save.
    pub config: ServiceConfig,
    metrics: Option<Arc<Metrics>>,
    poll_guard: Mutex<()>,
    action_guard: Mutex<()>,
}

impl Service {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        settings: ServiceSettings,
        lookup: LatestVersionLookup,
        notify: Vec<Notify>,
        command: Vec<Vec<String>>,
        webhook: Vec<WebHook>,
        status: Status,
        config: ServiceConfig,
    ) -> Self {
        Self {
            id: id.into(),
            settings,
            lookup,
            notify,
            command,
            webhook,
            status,
            config,
            metrics: None,
            poll_guard: Mutex::new(()),
            action_guard: Mutex::new(()),
        }
    }

    /// Register this unit's own counters (queries and commands). Notifier and
    /// webhook counters are registered when those attach.
    pub fn register_metrics(&mut self, metrics: &Arc<Metrics>) {
        metrics.register_result(LATEST_VERSION_QUERY, &[("service", self.id.as_str())]);
        for argv in &self.command {
            let command = display_argv(argv);
            metrics.register_result(
                COMMAND_RESULT,
                &[("id", command.as_str()), ("service", self.id.as_str())],
            );
        }
        self.metrics = Some(Arc::clone(metrics));
    }

    /// Delete every counter that belongs to this unit.
    pub fn remove_metrics(&self) {
        for notify in &self.notify {
            notify.remove_metrics();
        }
        for hook in &self.webhook {
            hook.remove_metrics();
        }
        if let Some(metrics) = &self.metrics {
            metrics.remove_where("service", &self.id);
        }
    }

    pub fn count_query(&self, ok: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_result(
                LATEST_VERSION_QUERY,
                &[("service", self.id.as_str())],
                Outcome::from_ok(ok),
            );
        }
    }

    pub fn count_command(&self, argv: &[String], ok: bool) {
        if let Some(metrics) = &self.metrics {
            let command = display_argv(argv);
            metrics.inc_result(
                COMMAND_RESULT,
                &[("id", command.as_str()), ("service", self.id.as_str())],
                Outcome::from_ok(ok),
            );
        }
    }

    /// Claim the poll slot. `None` while another poll of this unit runs.
    #[must_use]
    pub fn try_begin_poll(&self) -> Option<MutexGuard<'_, ()>> {
        self.poll_guard.try_lock()
    }

    /// Hold while deciding on and running commands and webhooks. Blocks
    /// until no other action of this unit is in flight.
    #[must_use]
    pub fn begin_actions(&self) -> MutexGuard<'_, ()> {
        self.action_guard.lock()
    }

    /// True when a new version needs an approval before actions run.
    #[must_use]
    pub fn needs_approval(&self) -> bool {
        !self.settings.auto_approve() && (!self.command.is_empty() || !self.webhook.is_empty())
    }

    /// Everything wrong with this unit, relative to `service.<id>`.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = self.settings.validate();
        report.extend(validate_actions(&self.notify, &self.command, &self.webhook));
        report
    }
}

/// Problems with a unit's notifiers, commands and webhooks.
#[must_use]
pub fn validate_actions(
    notify: &[Notify],
    command: &[Vec<String>],
    webhook: &[WebHook],
) -> ValidationReport {
    let mut report = ValidationReport::new();

    let mut notifiers = ValidationReport::new();
    for n in notify {
        notifiers.nest(n.id.clone(), n.validate());
    }
    report.nest("notify", notifiers);

    let mut commands = ValidationReport::new();
    for (i, argv) in command.iter().enumerate() {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            commands.required(format!("item_{i}"));
        }
    }
    report.nest("command", commands);

    let mut hooks = ValidationReport::new();
    for hook in webhook {
        hooks.nest(hook.id.clone(), hook.validate());
    }
    report.nest("webhook", hooks);
    report
}
