//! `rwatch once`: poll every unit a single time without acting.

use std::collections::BTreeMap;

use serde::Serialize;

use super::report::StepReport;
use crate::core::config::ConfigFile;
use crate::core::errors::{Result, RwError};
use crate::daemon::poll::poll;
use crate::daemon::{Collaborators, PollMode, PollOutcome};
use crate::service::Catalog;
use crate::status::Channels;

#[derive(Debug, Clone, Default, Serialize)]
pub struct OnceReport {
    pub steps: StepReport,
    pub outcomes: BTreeMap<String, PollOutcome>,
}

fn describe(id: &str, outcome: &PollOutcome) -> String {
    match outcome {
        PollOutcome::First { version } => format!("{id}: {version} (first)"),
        PollOutcome::New { version, .. } => format!("{id}: {version} (new)"),
        PollOutcome::Unchanged { version } => format!("{id}: {version} (unchanged)"),
        _ => id.to_string(),
    }
}

/// Poll `only`, or every unit, in dry-run mode. Units excluded by
/// validation and inactive units are reported as skipped.
pub fn run_once(
    config: &ConfigFile,
    collab: &Collaborators,
    only: Option<&str>,
) -> Result<OnceReport> {
    if let Some(id) = only {
        if !config.service.contains_key(id) {
            return Err(RwError::UnknownService {
                service_id: id.to_string(),
            });
        }
    }
    let catalog = Catalog::build(config, &Channels::default(), None);
    let mut report = OnceReport::default();

    for id in config.service.keys() {
        if only.is_some_and(|wanted| wanted != id) {
            continue;
        }
        let Some(service) = catalog.get(id) else {
            report.steps.step_skip(id.as_str(), "excluded: invalid configuration");
            continue;
        };
        if !service.settings.active() {
            report.steps.step_skip(id.as_str(), "inactive");
            continue;
        }
        let outcome = poll(service, collab, PollMode::DryRun);
        match &outcome {
            PollOutcome::SourceFailed { error } => report.steps.step_fail(id.as_str(), error.as_str()),
            PollOutcome::Missed { message } => report.steps.step_fail(id.as_str(), message.as_str()),
            PollOutcome::Rejected { reason } => report.steps.step_fail(id.as_str(), reason.as_str()),
            PollOutcome::Busy => report.steps.step_skip(id.as_str(), "busy"),
            other => report.steps.step_ok(describe(id, other)),
        }
        report.outcomes.insert(id.clone(), outcome);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cli::report::StepState;
    use crate::notify::{CommandError, CommandRunner, Deliver, DeliveryError, DeliveryTarget, Message};
    use crate::source::{LookupRequest, VersionSource};

    struct Fixed(&'static str);

    impl VersionSource for Fixed {
        fn fetch(&self, _request: &LookupRequest) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Refuse;

    impl Deliver for Refuse {
        fn send(
            &self,
            _target: &DeliveryTarget,
            _message: &Message,
        ) -> std::result::Result<(), DeliveryError> {
            panic!("dry run must not deliver");
        }
    }

    impl CommandRunner for Refuse {
        fn run(&self, _argv: &[String]) -> std::result::Result<(), CommandError> {
            panic!("dry run must not run commands");
        }
    }

    fn collab(body: &'static str) -> Collaborators {
        Collaborators {
            source: Arc::new(Fixed(body)),
            deliver: Arc::new(Refuse),
            runner: Arc::new(Refuse),
        }
    }

    const CONFIG: &str = r#"
[service.argus]
command = [["deploy.sh", "{{ version }}"]]
[service.argus.latest_version]
type = "url"
url = "https://example.com/releases"
url_commands = [{ type = "regex", regex = "v([0-9.]+)" }]

[service.idle.options]
active = false
[service.idle.latest_version]
type = "url"
url = "https://example.com/idle"

[service.broken.latest_version]
type = "url"
url = "https://example.com/broken"
url_commands = [{ type = "regex" }]
"#;

    #[test]
    fn polls_active_units_and_skips_the_rest() {
        let config = ConfigFile::from_toml_str(CONFIG).unwrap();
        let report = run_once(&config, &collab("release v1.4.0"), None).unwrap();
        let states: Vec<_> = report
            .steps
            .steps
            .iter()
            .map(|s| (s.description.as_str(), s.state))
            .collect();
        assert_eq!(
            states,
            vec![
                ("argus: 1.4.0 (first)", StepState::Ok),
                ("broken", StepState::Skip),
                ("idle", StepState::Skip),
            ]
        );
        assert!(report.steps.success());
        assert_eq!(report.outcomes["argus"].version(), Some("1.4.0"));
    }

    #[test]
    fn misses_are_failures() {
        let config = ConfigFile::from_toml_str(CONFIG).unwrap();
        let report = run_once(&config, &collab("nothing here"), Some("argus")).unwrap();
        assert_eq!(report.steps.steps.len(), 1);
        assert_eq!(report.steps.failures(), 1);
    }

    #[test]
    fn unknown_unit_is_an_error() {
        let config = ConfigFile::from_toml_str(CONFIG).unwrap();
        let err = run_once(&config, &collab(""), Some("nope")).unwrap_err();
        assert_eq!(err.code(), "RW-1101");
    }
}
