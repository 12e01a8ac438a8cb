//! Delivery backends for notifiers and webhooks.
//!
//! The core only sees [`Deliver`]: hand it a fully resolved
//! [`DeliveryTarget`] and a [`Message`], get success or a [`DeliveryError`].
//! [`Retrying`] adds the resolved retry policy on top of any backend.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::curl::CurlInvocation;

/// Why one delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("transport failure: {details}")]
    Transport { details: String },

    #[error("unexpected HTTP status {got} (wanted {want})")]
    Status { got: u16, want: String },

    #[error("target misconfigured: {details}")]
    Misconfigured { details: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<DeliveryError>,
    },
}

/// What to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Human text; the backend shapes it for the target type.
    Text { title: String, body: String },
    /// A pre-built JSON document, sent as is.
    Json(String),
}

impl Message {
    #[must_use]
    pub fn text(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Text {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// A fully resolved endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryTarget {
    /// Notifier or webhook name.
    pub id: String,
    /// Delivery type (`slack`, `log`, `github`, ...).
    pub kind: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: BTreeMap<String, String>,
    /// Required HTTP status. `0` accepts any 2xx.
    pub desired_status: u16,
    pub allow_invalid_certs: bool,
    pub max_tries: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl DeliveryTarget {
    #[must_use]
    pub fn accepts(&self, status: u16) -> bool {
        if self.desired_status == 0 {
            (200..300).contains(&status)
        } else {
            status == self.desired_status
        }
    }
}

pub trait Deliver: Send + Sync {
    fn send(&self, target: &DeliveryTarget, message: &Message) -> Result<(), DeliveryError>;
}

impl<D: Deliver + ?Sized> Deliver for std::sync::Arc<D> {
    fn send(&self, target: &DeliveryTarget, message: &Message) -> Result<(), DeliveryError> {
        (**self).send(target, message)
    }
}

// ──────────────────── retry ────────────────────

/// Retries a backend up to `target.max_tries` times, sleeping `target.delay`
/// between attempts.
#[derive(Debug, Clone)]
pub struct Retrying<D> {
    inner: D,
}

impl<D> Retrying<D> {
    pub const fn new(inner: D) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Deliver> Deliver for Retrying<D> {
    fn send(&self, target: &DeliveryTarget, message: &Message) -> Result<(), DeliveryError> {
        let tries = target.max_tries.max(1);
        let mut last = None;
        for attempt in 1..=tries {
            match self.inner.send(target, message) {
                Ok(()) => return Ok(()),
                Err(err @ DeliveryError::Misconfigured { .. }) => return Err(err),
                Err(err) => {
                    debug!(target_id = %target.id, attempt, tries, error = %err, "delivery attempt failed");
                    last = Some(err);
                }
            }
            if attempt < tries && !target.delay.is_zero() {
                std::thread::sleep(target.delay);
            }
        }
        let last = last.unwrap_or(DeliveryError::Transport {
            details: "no attempt made".to_string(),
        });
        if tries == 1 {
            Err(last)
        } else {
            Err(DeliveryError::Exhausted {
                attempts: tries,
                last: Box::new(last),
            })
        }
    }
}

// ──────────────────── backends ────────────────────

/// Emits the message as a tracing event. Used for `type = "log"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

impl Deliver for LogDelivery {
    fn send(&self, target: &DeliveryTarget, message: &Message) -> Result<(), DeliveryError> {
        match message {
            Message::Text { title, body } => {
                info!(notify = %target.id, title = %title, "{body}");
            }
            Message::Json(payload) => {
                info!(webhook = %target.id, bytes = payload.len(), "{payload}");
            }
        }
        Ok(())
    }
}

/// JSON POST through the `curl` binary.
#[derive(Debug, Clone)]
pub struct CurlDelivery {
    pub timeout: Duration,
}

impl Default for CurlDelivery {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Shape a text message for the target type.
#[must_use]
pub fn render_payload(target: &DeliveryTarget, message: &Message) -> String {
    let (title, body) = match message {
        Message::Json(payload) => return payload.clone(),
        Message::Text { title, body } => (title.as_str(), body.as_str()),
    };
    let param = |key: &str| target.params.get(key).map_or("", String::as_str);
    let value = match target.kind.as_str() {
        "slack" => {
            let text = if title.is_empty() {
                body.to_string()
            } else {
                format!("*{title}*\n{body}")
            };
            json!({ "text": text })
        }
        "discord" => json!({ "content": body, "username": param("username") }),
        "gotify" => json!({
            "title": title,
            "message": body,
            "priority": param("priority").parse::<i64>().unwrap_or(0),
        }),
        _ => json!({ "title": title, "message": body }),
    };
    value.to_string()
}

impl CurlDelivery {
    /// The POST for one delivery. Headers, URL and payload all travel on
    /// stdin.
    #[must_use]
    pub fn invocation(&self, target: &DeliveryTarget, payload: &str) -> CurlInvocation {
        let mut curl = CurlInvocation::new(self.timeout);
        curl.flag("-sS")
            .flag("-o")
            .flag("/dev/null")
            .flag("-w")
            .flag("%{http_code}")
            .flag("-X")
            .flag("POST");
        if target.allow_invalid_certs {
            curl.flag("-k");
        }
        curl.header("Content-Type", "application/json");
        for (name, value) in &target.headers {
            curl.header(name, value);
        }
        curl.option("data-raw", payload).option("url", &target.url);
        curl
    }
}

impl Deliver for CurlDelivery {
    fn send(&self, target: &DeliveryTarget, message: &Message) -> Result<(), DeliveryError> {
        if target.url.is_empty() {
            return Err(DeliveryError::Misconfigured {
                details: format!("{} has no url", target.id),
            });
        }
        let payload = render_payload(target, message);
        let output = self
            .invocation(target, &payload)
            .output()
            .map_err(|e| DeliveryError::Transport {
                details: format!("curl not found or failed: {e}"),
            })?;
        if !output.status.success() {
            return Err(DeliveryError::Transport {
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let code = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<u16>()
            .unwrap_or(0);
        if target.accepts(code) {
            Ok(())
        } else {
            warn!(target_id = %target.id, status = code, "delivery rejected");
            Err(DeliveryError::Status {
                got: code,
                want: if target.desired_status == 0 {
                    "2xx".to_string()
                } else {
                    target.desired_status.to_string()
                },
            })
        }
    }
}

/// Routes `log` targets to [`LogDelivery`] and everything else to
/// [`CurlDelivery`], with retries.
#[derive(Debug, Clone, Default)]
pub struct DefaultDelivery {
    log: LogDelivery,
    http: Retrying<CurlDelivery>,
}

impl<D: Default> Default for Retrying<D> {
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl Deliver for DefaultDelivery {
    fn send(&self, target: &DeliveryTarget, message: &Message) -> Result<(), DeliveryError> {
        if target.kind == "log" {
            self.log.send(target, message)
        } else {
            self.http.send(target, message)
        }
    }
}
