//! What happens after a new version is seen: notifiers, then (once approved)
//! commands and webhooks, then the deployed version moves.

use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::errors::{Result, RwError};
use crate::core::template::TemplateVars;
use crate::notify::command::{display_argv, render_argv};
use crate::notify::{CommandRunner, Deliver, DefaultDelivery, ProcessRunner};
use crate::service::Service;
use crate::source::{CurlSource, VersionSource};
use crate::status::{AnnounceKind, FailState};

/// Prefix of an approval that skips a version.
pub const SKIP_PREFIX: &str = "SKIP_";

/// The outside world a unit talks to.
pub struct Collaborators {
    pub source: Arc<dyn VersionSource>,
    pub deliver: Arc<dyn Deliver>,
    pub runner: Arc<dyn CommandRunner>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            source: Arc::new(CurlSource::default()),
            deliver: Arc::new(DefaultDelivery::default()),
            runner: Arc::new(ProcessRunner),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn from_result<E: Display>(id: impl Into<String>, result: &std::result::Result<(), E>) -> Self {
        Self {
            id: id.into(),
            ok: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notify: Vec<ActionResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<ActionResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub webhook: Vec<ActionResult>,
    /// Commands and webhooks wait for an approval.
    pub awaiting_approval: bool,
    /// The deployed version moved to the latest.
    pub deployed: bool,
}

impl ActionReport {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.notify
            .iter()
            .chain(&self.command)
            .chain(&self.webhook)
            .filter(|r| !r.ok)
            .count()
    }
}

/// `SKIP_<version>`.
#[must_use]
pub fn skip_marker(version: &str) -> String {
    format!("{SKIP_PREFIX}{version}")
}

fn send_notifications(service: &Service, deliver: &dyn Deliver, vars: &TemplateVars<'_>) -> Vec<ActionResult> {
    service
        .notify
        .iter()
        .map(|notify| {
            let result = notify.send(deliver, vars);
            service
                .status
                .fails
                .notify
                .set(&notify.id, FailState::from_ok(result.is_ok()));
            ActionResult::from_result(notify.id.clone(), &result)
        })
        .collect()
}

/// Run commands and webhooks. With `only_pending`, those that already
/// succeeded are left alone. Callers hold [`Service::begin_actions`].
fn deploy(service: &Service, collab: &Collaborators, only_pending: bool, report: &mut ActionReport) {
    let status = &service.status;
    let version = status.latest_version();
    let web_url = status.web_url();
    let vars = TemplateVars {
        service_id: &service.id,
        version: &version,
        web_url: &web_url,
    };

    for (i, argv) in service.command.iter().enumerate() {
        if only_pending && !status.fails.command.get(i).is_pending() {
            continue;
        }
        let rendered = render_argv(argv, &vars);
        let result = collab.runner.run(&rendered);
        match &result {
            Ok(()) => info!(service = %service.id, command = %display_argv(&rendered), "command ran"),
            Err(err) => warn!(service = %service.id, error = %err, "command failed"),
        }
        service.count_command(argv, result.is_ok());
        status.fails.command.set(i, FailState::from_ok(result.is_ok()));
        report
            .command
            .push(ActionResult::from_result(display_argv(&rendered), &result));
    }

    for hook in &service.webhook {
        if only_pending && !status.fails.webhook.get(&hook.id).is_pending() {
            continue;
        }
        let result = hook.send(collab.deliver.as_ref(), &vars);
        status
            .fails
            .webhook
            .set(&hook.id, FailState::from_ok(result.is_ok()));
        report
            .webhook
            .push(ActionResult::from_result(hook.id.clone(), &result));
    }

    if status.fails.command.all_succeeded() && status.fails.webhook.all_succeeded() {
        info!(service = %service.id, version = %version, "deployed");
        status.set_deployed_version(&version, true);
        report.deployed = true;
    }
    status.announce(AnnounceKind::Action);
}

/// Fire everything a freshly seen latest version calls for.
pub fn on_new_version(service: &Service, collab: &Collaborators) -> ActionReport {
    let status = &service.status;
    let version = status.latest_version();
    let web_url = status.web_url();
    let vars = TemplateVars {
        service_id: &service.id,
        version: &version,
        web_url: &web_url,
    };
    let mut report = ActionReport {
        notify: send_notifications(service, collab.deliver.as_ref(), &vars),
        ..ActionReport::default()
    };

    if service.needs_approval() {
        info!(service = %service.id, version = %version, "awaiting approval");
        report.awaiting_approval = true;
        return report;
    }
    let _actions = service.begin_actions();
    if status.deployed_version() != version {
        deploy(service, collab, false, &mut report);
    }
    report
}

fn ensure_latest(service: &Service, version: &str) -> Result<()> {
    let latest = service.status.latest_version();
    if version == latest {
        Ok(())
    } else {
        Err(RwError::StaleVersion {
            service_id: service.id.clone(),
            requested: version.to_string(),
            latest,
        })
    }
}

/// Approve `version` (the latest) and run commands and webhooks for it.
/// Approving the version that is already deployed runs nothing.
pub fn approve(service: &Service, collab: &Collaborators, version: &str) -> Result<ActionReport> {
    let _actions = service.begin_actions();
    ensure_latest(service, version)?;
    let mut report = ActionReport::default();
    if service.status.deployed_version() == version {
        info!(service = %service.id, version, "already deployed");
        return Ok(report);
    }
    service.status.set_approved_version(version, true);
    deploy(service, collab, false, &mut report);
    Ok(report)
}

/// Record that `version` (the latest) should not be deployed.
pub fn skip(service: &Service, version: &str) -> Result<()> {
    let _actions = service.begin_actions();
    ensure_latest(service, version)?;
    info!(service = %service.id, version, "skipped");
    service.status.set_approved_version(&skip_marker(version), true);
    Ok(())
}

/// Re-run commands and webhooks that failed or never ran for the latest
/// version. Nothing runs when it is already deployed, skipped, or still
/// waiting for an approval.
pub fn retry_failed(service: &Service, collab: &Collaborators) -> ActionReport {
    let _actions = service.begin_actions();
    let status = &service.status;
    let latest = status.latest_version();
    let approved = status.approved_version();
    let mut report = ActionReport::default();
    if latest.is_empty() || status.deployed_version() == latest || approved == skip_marker(&latest) {
        return report;
    }
    if service.needs_approval() && approved != latest {
        report.awaiting_approval = true;
        return report;
    }
    deploy(service, collab, true, &mut report);
    report
}
