//! Webhooks: signed HTTP POSTs that tell a deploy pipeline to roll out.
//!
//! Unlike notifiers, every webhook shares one defaults layer and one
//! hard-defaults layer regardless of its payload type.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::Rng;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, warn};

use super::delivery::{Deliver, DeliveryError, DeliveryTarget, Message};
use crate::core::config::{WebHookLayer, parse_duration};
use crate::core::defaults::{OverrideChain, Template, TemplateSet, attach_shared};
use crate::core::hard_defaults::WEBHOOK_TYPES;
use crate::core::metrics::{Metrics, Outcome, WEBHOOK_RESULT};
use crate::core::template::{TemplateVars, render};
use crate::core::validation::ValidationReport;

type HmacSha256 = Hmac<Sha256>;

/// Templates a webhook can inherit from.
#[derive(Debug, Clone, Default)]
pub struct WebHookTemplates {
    pub mains: TemplateSet<WebHookLayer>,
    pub defaults: Template<WebHookLayer>,
}

#[derive(Debug)]
pub struct WebHook {
    pub id: String,
    service_id: String,
    layer: WebHookLayer,
    effective_type: String,
    chain: OverrideChain<WebHookLayer>,
    metrics: Option<Arc<Metrics>>,
}

/// `sha256=<hex>` signature of `payload`, as GitHub sends it.
#[must_use]
pub fn sign(secret: &str, payload: &str) -> String {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn random_commit() -> String {
    let bytes: [u8; 20] = rand::rng().random();
    hex::encode(bytes)
}

impl WebHook {
    pub fn attach(
        id: &str,
        service_id: &str,
        mut layer: WebHookLayer,
        templates: &mut WebHookTemplates,
        hard: &Template<WebHookLayer>,
        metrics: Option<&Arc<Metrics>>,
    ) -> Self {
        let attached = attach_shared(id, &mut layer, &mut templates.mains, &templates.defaults, hard);
        let hook = Self {
            id: id.to_string(),
            service_id: service_id.to_string(),
            layer,
            effective_type: attached.effective_type,
            chain: attached.chain,
            metrics: metrics.cloned(),
        };
        if let Some(metrics) = &hook.metrics {
            metrics.register_result(WEBHOOK_RESULT, &hook.labels());
        }
        hook
    }

    fn labels(&self) -> [(&str, &str); 2] {
        [("id", self.id.as_str()), ("service", self.service_id.as_str())]
    }

    pub fn remove_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            for outcome in [Outcome::Success, Outcome::Fail] {
                let mut labels = self.labels().to_vec();
                labels.push(("result", outcome.as_str()));
                metrics.remove_series(WEBHOOK_RESULT, &labels);
            }
        }
    }

    /// Payload type, falling back to the shared defaults.
    #[must_use]
    pub fn kind(&self) -> String {
        if self.effective_type.is_empty() {
            self.chain.resolve(&self.layer, |l| l.kind.clone())
        } else {
            self.effective_type.clone()
        }
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.chain.resolve(&self.layer, |l| l.url.clone())
    }

    #[must_use]
    pub fn secret(&self) -> String {
        self.chain.resolve(&self.layer, |l| l.secret.clone())
    }

    #[must_use]
    pub fn allow_invalid_certs(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.allow_invalid_certs)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn desired_status_code(&self) -> u16 {
        self.chain
            .resolve(&self.layer, |l| l.desired_status_code)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn max_tries(&self) -> u32 {
        self.chain.resolve(&self.layer, |l| l.max_tries).unwrap_or(1)
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        parse_duration(&self.chain.resolve(&self.layer, |l| l.delay.clone())).unwrap_or_default()
    }

    /// Failures are recorded but not logged at warn level.
    #[must_use]
    pub fn silent_fails(&self) -> bool {
        self.chain
            .resolve(&self.layer, |l| l.silent_fails)
            .unwrap_or(false)
    }

    /// A push event body with fresh commit ids.
    #[must_use]
    pub fn payload(&self) -> String {
        json!({
            "ref": "refs/heads/master",
            "before": random_commit(),
            "after": random_commit(),
        })
        .to_string()
    }

    #[must_use]
    pub fn target(&self, payload: &str, vars: &TemplateVars<'_>) -> DeliveryTarget {
        let kind = self.kind();
        let secret = self.secret();
        let mut headers = Vec::new();
        if kind == "gitlab" {
            headers.push(("X-Gitlab-Event".to_string(), "Push Hook".to_string()));
            if !secret.is_empty() {
                headers.push(("X-Gitlab-Token".to_string(), secret));
            }
        } else {
            headers.push(("X-GitHub-Event".to_string(), "push".to_string()));
            if !secret.is_empty() {
                headers.push(("X-Hub-Signature-256".to_string(), sign(&secret, payload)));
            }
        }
        for (name, value) in self.chain.merge_maps(&self.layer, |l| &l.custom_headers) {
            headers.push((name, render(&value, vars)));
        }
        DeliveryTarget {
            id: self.id.clone(),
            kind,
            url: render(&self.url(), vars),
            headers,
            params: std::collections::BTreeMap::new(),
            desired_status: self.desired_status_code(),
            allow_invalid_certs: self.allow_invalid_certs(),
            max_tries: self.max_tries(),
            delay: self.delay(),
        }
    }

    pub fn send(&self, deliver: &dyn Deliver, vars: &TemplateVars<'_>) -> Result<(), DeliveryError> {
        let payload = self.payload();
        let target = self.target(&payload, vars);
        let result = deliver.send(&target, &Message::Json(payload));
        match &result {
            Ok(()) => debug!(service = %self.service_id, webhook = %self.id, "webhook delivered"),
            Err(err) if self.silent_fails() => {
                debug!(service = %self.service_id, webhook = %self.id, error = %err, "webhook failed");
            }
            Err(err) => {
                warn!(service = %self.service_id, webhook = %self.id, error = %err, "webhook failed");
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_result(WEBHOOK_RESULT, &self.labels(), Outcome::from_ok(result.is_ok()));
        }
        result
    }

    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        let kind = self.kind();
        if !WEBHOOK_TYPES.contains(&kind.as_str()) {
            report.invalid(
                "type",
                &kind,
                format!("expected one of {}", WEBHOOK_TYPES.join(", ")),
            );
        }
        if self.url().is_empty() {
            report.required("url");
        }
        let delay = self.chain.resolve(&self.layer, |l| l.delay.clone());
        if !delay.is_empty() && parse_duration(&delay).is_none() {
            report.invalid("delay", &delay, "expected a duration like 1h2m3s");
        }
        report
    }
}
