//! One poll of one unit: fetch, filter, check, compare, act.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::actions::{ActionReport, Collaborators, on_new_version};
use crate::filter::RequireMiss;
use crate::service::Service;
use crate::service::version::{Newness, compare};
use crate::status::AnnounceKind;

/// Whether a poll may act on what it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Persist, announce and run actions.
    Live,
    /// Update the in-memory status only.
    DryRun,
}

impl PollMode {
    const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Another poll of this unit is running.
    Busy,
    SourceFailed { error: String },
    /// A filter step or requirement check rejected the fetched text.
    Missed { message: String },
    /// The candidate isn't a semantic version.
    Rejected { reason: String },
    Unchanged { version: String },
    First { version: String },
    New { version: String, actions: ActionReport },
}

impl PollOutcome {
    /// The version the poll settled on, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Unchanged { version } | Self::First { version } | Self::New { version, .. } => {
                Some(version)
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceFailed { .. } | Self::Missed { .. } | Self::Rejected { .. }
        )
    }
}

fn missed(service: &Service, mode: PollMode, message: String) -> PollOutcome {
    if service.settings.ignore_misses() {
        debug!(service = %service.id, %message, "miss");
    } else {
        warn!(service = %service.id, %message, "miss");
    }
    service.count_query(false);
    if mode.is_live() {
        service.status.announce(AnnounceKind::Query);
    }
    PollOutcome::Missed { message }
}

/// Poll `service` once. At most one poll per unit runs at a time; a second
/// caller gets [`PollOutcome::Busy`] straight away.
pub fn poll(service: &Service, collab: &Collaborators, mode: PollMode) -> PollOutcome {
    let Some(_guard) = service.try_begin_poll() else {
        debug!(service = %service.id, "poll already running");
        return PollOutcome::Busy;
    };
    let status = &service.status;
    let live = mode.is_live();
    status.set_last_queried(None);

    let request = service.lookup.request(&service.id, &service.settings);
    let body = match collab.source.fetch(&request) {
        Ok(body) => body,
        Err(err) => {
            warn!(service = %service.id, error = %err, "lookup failed");
            service.count_query(false);
            return PollOutcome::SourceFailed {
                error: err.to_string(),
            };
        }
    };

    let candidate = match service.lookup.pipeline.run(&body) {
        Ok(text) => text.trim().to_string(),
        Err(miss) => {
            status.regex_miss_content();
            return missed(service, mode, miss.message().to_string());
        }
    };
    if let Err(miss) = service.lookup.require.check_version(&candidate) {
        status.regex_miss_version();
        return missed(service, mode, miss.to_string());
    }
    if let Err(miss @ RequireMiss::Content { .. }) =
        service.lookup.require.check_content(&body, &candidate)
    {
        status.regex_miss_content();
        return missed(service, mode, miss.to_string());
    }

    let current = status.latest_version();
    match compare(&candidate, &current, service.settings.semantic_versioning()) {
        Newness::Unparsable { reason } => {
            warn!(service = %service.id, %reason, "version rejected");
            service.count_query(false);
            PollOutcome::Rejected { reason }
        }
        Newness::NotNewer => {
            service.count_query(true);
            status.reset_regex_misses();
            if live {
                status.announce(AnnounceKind::Query);
            }
            PollOutcome::Unchanged { version: current }
        }
        Newness::First => {
            service.count_query(true);
            status.reset_regex_misses();
            info!(service = %service.id, version = %candidate, "first version seen");
            status.set_latest_version(&candidate, live);
            if status.deployed_version().is_empty() {
                status.set_deployed_version(&candidate, live);
            }
            if live {
                status.announce(AnnounceKind::Query);
            }
            PollOutcome::First { version: candidate }
        }
        Newness::Newer => {
            service.count_query(true);
            status.reset_regex_misses();
            info!(service = %service.id, from = %current, to = %candidate, "new version");
            status.set_latest_version(&candidate, live);
            let actions = if live {
                status.announce(AnnounceKind::New);
                on_new_version(service, collab)
            } else {
                ActionReport::default()
            };
            PollOutcome::New {
                version: candidate,
                actions,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::core::config::ConfigFile;
    use crate::core::errors::{Result, RwError};
    use crate::core::metrics::{LATEST_VERSION_QUERY, Metrics};
    use crate::daemon::actions::{approve, retry_failed, skip, skip_marker};
    use crate::notify::{CommandError, CommandRunner, Deliver, DeliveryError, DeliveryTarget, Message};
    use crate::service::Catalog;
    use crate::source::{LookupRequest, VersionSource};
    use crate::status::{Channels, FailState};

    #[derive(Default)]
    struct Scripted {
        bodies: Mutex<Vec<Result<String>>>,
    }

    impl Scripted {
        fn push(&self, body: &str) {
            self.bodies.lock().push(Ok(body.to_string()));
        }
    }

    impl VersionSource for Scripted {
        fn fetch(&self, request: &LookupRequest) -> Result<String> {
            let mut bodies = self.bodies.lock();
            if bodies.is_empty() {
                return Err(RwError::source(&request.service_id, "nothing scripted"));
            }
            bodies.remove(0)
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        fail: Mutex<bool>,
    }

    impl Deliver for Recorder {
        fn send(&self, target: &DeliveryTarget, _message: &Message) -> std::result::Result<(), DeliveryError> {
            self.sent.lock().push(target.id.clone());
            if *self.fail.lock() {
                Err(DeliveryError::Transport {
                    details: "down".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, argv: &[String]) -> std::result::Result<(), CommandError> {
            self.sent.lock().push(argv.join(" "));
            Ok(())
        }
    }

    struct Rig {
        catalog: Catalog,
        source: Arc<Scripted>,
        recorder: Arc<Recorder>,
        collab: Collaborators,
        metrics: Arc<Metrics>,
    }

    fn rig(extra: &str) -> Rig {
        let toml = format!(
            r#"
[service.app.latest_version]
type = "url"
url = "https://example.com/releases"
url_commands = [{{ type = "regex", regex = "v([0-9.]+)" }}]

[service.app.notify.ops]
type = "log"
{extra}
"#
        );
        let config = ConfigFile::from_toml_str(&toml).unwrap();
        let metrics = Arc::new(Metrics::new());
        let catalog = Catalog::build(&config, &Channels::default(), Some(&metrics));
        assert!(catalog.is_valid(), "{}", catalog.report);
        let source = Arc::new(Scripted::default());
        let recorder = Arc::new(Recorder::default());
        let collab = Collaborators {
            source: source.clone(),
            deliver: recorder.clone(),
            runner: recorder.clone(),
        };
        Rig {
            catalog,
            source,
            recorder,
            collab,
            metrics,
        }
    }

    impl Rig {
        fn app(&self) -> &Service {
            self.catalog.get("app").unwrap()
        }

        fn poll(&self, body: &str) -> PollOutcome {
            self.source.push(body);
            poll(self.app(), &self.collab, PollMode::Live)
        }
    }

    #[test]
    fn first_observation_sets_latest_and_deployed_without_notifying() {
        let rig = rig("");
        let outcome = rig.poll("release v1.2.0");
        assert_eq!(outcome, PollOutcome::First { version: "1.2.0".into() });
        let status = &rig.app().status;
        assert_eq!(status.latest_version(), "1.2.0");
        assert_eq!(status.deployed_version(), "1.2.0");
        assert!(rig.recorder.sent.lock().is_empty());
    }

    #[test]
    fn newer_version_notifies_and_deploys_without_actions_to_approve() {
        let rig = rig("");
        rig.poll("v1.2.0");
        let outcome = rig.poll("v1.3.0");
        let PollOutcome::New { version, actions } = outcome else {
            panic!("expected a new version");
        };
        assert_eq!(version, "1.3.0");
        assert!(actions.deployed);
        assert_eq!(rig.recorder.sent.lock().as_slice(), ["ops"]);
        assert_eq!(rig.app().status.deployed_version(), "1.3.0");
    }

    #[test]
    fn same_or_older_version_is_unchanged() {
        let rig = rig("");
        rig.poll("v1.2.0");
        assert!(matches!(rig.poll("v1.2.0"), PollOutcome::Unchanged { .. }));
        assert!(matches!(rig.poll("v1.1.9"), PollOutcome::Unchanged { .. }));
        assert_eq!(rig.app().status.latest_version(), "1.2.0");
        assert_eq!(
            rig.metrics
                .get(LATEST_VERSION_QUERY, &[("service", "app"), ("result", "SUCCESS")]),
            Some(3)
        );
    }

    #[test]
    fn filter_miss_counts_and_keeps_latest() {
        let rig = rig("");
        rig.poll("v1.0.0");
        let outcome = rig.poll("no version here");
        assert!(matches!(outcome, PollOutcome::Missed { .. }));
        let status = &rig.app().status;
        assert_eq!(status.regex_misses_content(), 1);
        assert_eq!(status.latest_version(), "1.0.0");
        rig.poll("v1.0.0");
        assert_eq!(status.regex_misses_content(), 0);
    }

    #[test]
    fn ignored_misses_are_still_counted() {
        let rig = rig("[service.app.options]\nignore_misses = true\n");
        assert!(matches!(rig.poll("nothing"), PollOutcome::Missed { .. }));
        assert_eq!(rig.app().status.regex_misses_content(), 1);
    }

    #[test]
    fn version_requirement_rejects_candidate() {
        let rig = rig("[service.app.latest_version.require]\nregex_version = '^1\\.'\n");
        let outcome = rig.poll("v2.0.0");
        assert!(matches!(outcome, PollOutcome::Missed { .. }));
        assert_eq!(rig.app().status.regex_misses_version(), 1);
        assert_eq!(rig.app().status.latest_version(), "");
    }

    #[test]
    fn unparsable_version_is_rejected() {
        let rig = rig("");
        let outcome = rig.poll("v1.2");
        assert!(matches!(outcome, PollOutcome::Rejected { .. }));
        assert_eq!(rig.app().status.latest_version(), "");
        assert_eq!(rig.app().status.deployed_version(), "");
    }

    #[test]
    fn source_failure_is_reported() {
        let rig = rig("");
        let outcome = poll(rig.app(), &rig.collab, PollMode::Live);
        assert!(outcome.is_failure());
        assert_eq!(
            rig.metrics
                .get(LATEST_VERSION_QUERY, &[("service", "app"), ("result", "FAIL")]),
            Some(1)
        );
    }

    #[test]
    fn concurrent_poll_is_refused() {
        let rig = rig("");
        let _held = rig.app().try_begin_poll().unwrap();
        assert_eq!(poll(rig.app(), &rig.collab, PollMode::Live), PollOutcome::Busy);
    }

    #[test]
    fn dry_run_takes_no_action() {
        let rig = rig("");
        rig.poll("v1.0.0");
        rig.source.push("v2.0.0");
        let outcome = poll(rig.app(), &rig.collab, PollMode::DryRun);
        assert!(matches!(outcome, PollOutcome::New { ref actions, .. } if !actions.deployed));
        assert!(rig.recorder.sent.lock().is_empty());
    }

    const GATED: &str = r#"
[service.app]
command = [["deploy.sh", "{{ version }}"]]
"#;

    #[test]
    fn commands_wait_for_approval() {
        let rig = rig(GATED);
        rig.poll("v1.0.0");
        let PollOutcome::New { actions, .. } = rig.poll("v1.1.0") else {
            panic!("expected a new version");
        };
        assert!(actions.awaiting_approval);
        assert_eq!(rig.app().status.deployed_version(), "1.0.0");

        assert!(approve(rig.app(), &rig.collab, "1.0.0").is_err());
        let report = approve(rig.app(), &rig.collab, "1.1.0").unwrap();
        assert!(report.deployed);
        assert!(rig.recorder.sent.lock().contains(&"deploy.sh 1.1.0".to_string()));
        let status = &rig.app().status;
        assert_eq!(status.deployed_version(), "1.1.0");
        assert_eq!(status.approved_version(), "");
    }

    #[test]
    fn skipped_version_is_not_retried() {
        let rig = rig(GATED);
        rig.poll("v1.0.0");
        rig.poll("v1.1.0");
        skip(rig.app(), "1.1.0").unwrap();
        assert_eq!(rig.app().status.approved_version(), skip_marker("1.1.0"));
        let report = retry_failed(rig.app(), &rig.collab);
        assert!(report.command.is_empty());
        assert_eq!(rig.app().status.deployed_version(), "1.0.0");
    }

    #[test]
    fn retry_runs_only_failed_webhooks() {
        let rig = rig(
            r#"
[service.app.dashboard]
auto_approve = true

[service.app.webhook.ci]
url = "https://ci.example.com/hook"
"#,
        );
        rig.poll("v1.0.0");
        *rig.recorder.fail.lock() = true;
        let PollOutcome::New { actions, .. } = rig.poll("v1.1.0") else {
            panic!("expected a new version");
        };
        assert!(!actions.deployed);
        let status = &rig.app().status;
        assert_eq!(status.fails.webhook.get("ci"), FailState::Failed);

        *rig.recorder.fail.lock() = false;
        let report = retry_failed(rig.app(), &rig.collab);
        assert_eq!(report.webhook.len(), 1);
        assert!(report.deployed);
        assert_eq!(status.deployed_version(), "1.1.0");
        assert!(retry_failed(rig.app(), &rig.collab).webhook.is_empty());
    }

    /// Takes a while per command so overlapping callers would interleave.
    #[derive(Default)]
    struct SlowRunner {
        runs: Mutex<Vec<String>>,
    }

    impl CommandRunner for SlowRunner {
        fn run(&self, argv: &[String]) -> std::result::Result<(), CommandError> {
            std::thread::sleep(std::time::Duration::from_millis(200));
            self.runs.lock().push(argv.join(" "));
            Ok(())
        }
    }

    #[test]
    fn overlapping_retry_and_approve_run_the_command_once() {
        let rig = rig(
            r#"
[service.app]
command = [["deploy.sh", "{{ version }}"]]

[service.app.dashboard]
auto_approve = true
"#,
        );
        rig.poll("v1.0.0");
        rig.source.push("v1.1.0");
        poll(rig.app(), &rig.collab, PollMode::DryRun);
        assert_eq!(rig.app().status.latest_version(), "1.1.0");
        assert_eq!(rig.app().status.deployed_version(), "1.0.0");

        let runner = Arc::new(SlowRunner::default());
        let collab = Collaborators {
            source: rig.source.clone(),
            deliver: rig.recorder.clone(),
            runner: runner.clone(),
        };
        std::thread::scope(|scope| {
            scope.spawn(|| retry_failed(rig.app(), &collab));
            scope.spawn(|| approve(rig.app(), &collab, "1.1.0").unwrap());
        });

        assert_eq!(runner.runs.lock().as_slice(), ["deploy.sh 1.1.0"]);
        assert_eq!(rig.app().status.deployed_version(), "1.1.0");
    }

    #[test]
    fn approving_the_deployed_version_runs_nothing() {
        let rig = rig(GATED);
        rig.poll("v1.0.0");
        rig.poll("v1.1.0");
        approve(rig.app(), &rig.collab, "1.1.0").unwrap();
        rig.recorder.sent.lock().clear();

        let report = approve(rig.app(), &rig.collab, "1.1.0").unwrap();
        assert!(report.command.is_empty());
        assert!(rig.recorder.sent.lock().is_empty());
    }
}
