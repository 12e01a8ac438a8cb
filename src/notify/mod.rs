//! Notifiers, webhooks and commands: the actions fired for a new version.
//!
//! A [`Notify`] is one notifier attached to a unit. It keeps its own layer and
//! the override chain above it; every setting is resolved on read.

pub mod command;
pub mod delivery;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::config::{NotifyLayer, parse_duration};
use crate::core::defaults::{OverrideChain, TemplateSet, attach_typed};
use crate::core::hard_defaults::{HardDefaults, NOTIFY_TYPES};
use crate::core::metrics::{Metrics, NOTIFY_RESULT, Outcome};
use crate::core::template::{TemplateVars, render};
use crate::core::validation::ValidationReport;

pub use command::{CommandError, CommandRunner, ProcessRunner};
pub use delivery::{
    CurlDelivery, DefaultDelivery, Deliver, DeliveryError, DeliveryTarget, LogDelivery, Message,
    Retrying,
};
pub use webhook::WebHook;

/// Templates a notifier can inherit from.
#[derive(Debug, Clone, Default)]
pub struct NotifyTemplates {
    pub mains: TemplateSet<NotifyLayer>,
    pub defaults: TemplateSet<NotifyLayer>,
}

#[derive(Debug)]
pub struct Notify {
    pub id: String,
    service_id: String,
    layer: NotifyLayer,
    effective_type: String,
    chain: OverrideChain<NotifyLayer>,
    metrics: Option<Arc<Metrics>>,
}

impl Notify {
    /// Attach `layer` (the unit's `[service.<id>.notify.<name>]` table) to its
    /// templates. Counters are registered only when `metrics` is given and
    /// the type is known.
    pub fn attach(
        id: &str,
        service_id: &str,
        mut layer: NotifyLayer,
        templates: &mut NotifyTemplates,
        hard: &mut HardDefaults,
        metrics: Option<&Arc<Metrics>>,
    ) -> Self {
        let main_type = templates.mains.ensure(id).read().kind.clone();
        let kind = if layer.kind.is_empty() { main_type } else { layer.kind.clone() };
        hard.ensure_notify(&kind);
        let attached = attach_typed(
            id,
            &mut layer,
            &mut templates.mains,
            &mut templates.defaults,
            &mut hard.notify,
        );
        let notify = Self {
            id: id.to_string(),
            service_id: service_id.to_string(),
            layer,
            effective_type: attached.effective_type,
            chain: attached.chain,
            metrics: metrics.filter(|_| !kind.is_empty()).cloned(),
        };
        notify.register_metrics();
        notify
    }

    fn labels(&self) -> [(&str, &str); 3] {
        [
            ("id", self.id.as_str()),
            ("service", self.service_id.as_str()),
            ("type", self.effective_type.as_str()),
        ]
    }

    fn register_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.register_result(NOTIFY_RESULT, &self.labels());
        }
    }

    /// Drop this notifier's counters.
    pub fn remove_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            for outcome in [Outcome::Success, Outcome::Fail] {
                let mut labels = self.labels().to_vec();
                labels.push(("result", outcome.as_str()));
                metrics.remove_series(NOTIFY_RESULT, &labels);
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.effective_type
    }

    /// The instance's own layer, as normalised at attach time.
    #[must_use]
    pub const fn layer(&self) -> &NotifyLayer {
        &self.layer
    }

    #[must_use]
    pub fn option(&self, key: &str) -> String {
        self.chain
            .resolve(&self.layer, |l| l.options.get(key).cloned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn url_field(&self, key: &str) -> String {
        self.chain
            .resolve(&self.layer, |l| l.url_fields.get(key).cloned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn param(&self, key: &str) -> String {
        self.chain
            .resolve(&self.layer, |l| l.params.get(key).cloned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn max_tries(&self) -> u32 {
        self.option("max_tries").parse().unwrap_or(1)
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        parse_duration(&self.option("delay")).unwrap_or_default()
    }

    /// Endpoint URL for HTTP types. Empty for `log`.
    #[must_use]
    pub fn url(&self) -> String {
        let url = self.url_field("url");
        if !url.is_empty() || self.effective_type != "gotify" {
            return url;
        }
        let host = self.url_field("host");
        let token = self.url_field("token");
        if host.is_empty() {
            String::new()
        } else {
            format!("https://{host}/message?token={token}")
        }
    }

    #[must_use]
    pub fn target(&self) -> DeliveryTarget {
        DeliveryTarget {
            id: self.id.clone(),
            kind: self.effective_type.clone(),
            url: self.url(),
            headers: Vec::new(),
            params: self.chain.merge_maps(&self.layer, |l| &l.params),
            desired_status: 0,
            allow_invalid_certs: false,
            max_tries: self.max_tries(),
            delay: self.delay(),
        }
    }

    #[must_use]
    pub fn message(&self, vars: &TemplateVars<'_>) -> Message {
        let title = render(&self.param("title"), vars);
        let title = if title.is_empty() { vars.service_id.to_string() } else { title };
        Message::text(title, render(&self.option("message"), vars))
    }

    /// Deliver the templated message and count the outcome.
    pub fn send(&self, deliver: &dyn Deliver, vars: &TemplateVars<'_>) -> Result<(), DeliveryError> {
        let result = deliver.send(&self.target(), &self.message(vars));
        match &result {
            Ok(()) => debug!(service = %self.service_id, notify = %self.id, "notification sent"),
            Err(err) => {
                warn!(service = %self.service_id, notify = %self.id, error = %err, "notification failed");
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_result(NOTIFY_RESULT, &self.labels(), Outcome::from_ok(result.is_ok()));
        }
        result
    }

    /// Problems with the resolved configuration, relative to this notifier.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        if self.effective_type.is_empty() {
            report.required("type");
        } else if !NOTIFY_TYPES.contains(&self.effective_type.as_str()) {
            report.invalid(
                "type",
                &self.effective_type,
                format!("expected one of {}", NOTIFY_TYPES.join(", ")),
            );
        }

        let mut options = ValidationReport::new();
        let max_tries = self.option("max_tries");
        if !max_tries.is_empty() && max_tries.parse::<u32>().is_err() {
            options.invalid("max_tries", &max_tries, "expected a whole number");
        }
        let delay = self.option("delay");
        if !delay.is_empty() && parse_duration(&delay).is_none() {
            options.invalid("delay", &delay, "expected a duration like 1h2m3s");
        }
        report.nest("options", options);

        if !self.effective_type.is_empty() && self.effective_type != "log" && self.url().is_empty() {
            let mut url_fields = ValidationReport::new();
            if self.effective_type == "gotify" {
                url_fields.required("host");
            } else {
                url_fields.required("url");
            }
            report.nest("url_fields", url_fields);
        }
        report
    }
}
