//! Shared helpers for the integration tests: CLI runner and recording fakes.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use parking_lot::Mutex;
use release_watcher::core::errors::{Result, RwError};
use release_watcher::daemon::Collaborators;
use release_watcher::notify::{
    CommandError, CommandRunner, Deliver, DeliveryError, DeliveryTarget, Message,
};
use release_watcher::source::{LookupRequest, VersionSource};

// ──────────────────── CLI runner ────────────────────

pub struct CliResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// Full transcript of the run, kept for failure messages.
    pub log_path: PathBuf,
}

fn log_dir() -> PathBuf {
    let dir = std::env::temp_dir().join("rwatch-cli-cases");
    let _ = std::fs::create_dir_all(&dir);
    dir
}

/// Run the `rwatch` binary with `args` and a clean environment.
pub fn run_cli_case(case: &str, args: &[&str]) -> CliResult {
    let output = Command::new(env!("CARGO_BIN_EXE_rwatch"))
        .args(args)
        .env_remove("RWATCH_CONFIG")
        .env("RWATCH_LOG", "warn")
        .output()
        .expect("failed to spawn rwatch");
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let mut transcript = String::new();
    let _ = writeln!(transcript, "args: {args:?}");
    let _ = writeln!(transcript, "status: {}", output.status);
    let _ = writeln!(transcript, "--- stdout ---\n{stdout}");
    let _ = writeln!(transcript, "--- stderr ---\n{stderr}");
    let log_path = log_dir().join(format!("{case}.log"));
    std::fs::write(&log_path, transcript).expect("failed to write case log");

    CliResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Write `body` to `rwatch.toml` inside `dir`.
pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("rwatch.toml");
    std::fs::write(&path, body).expect("failed to write config");
    path
}

// ──────────────────── fakes ────────────────────

/// Serves whatever body was last set. An empty body is a fetch error.
#[derive(Default)]
pub struct StaticSource {
    body: Mutex<String>,
    fetches: Mutex<usize>,
}

impl StaticSource {
    pub fn new(body: &str) -> Arc<Self> {
        let source = Self::default();
        source.set(body);
        Arc::new(source)
    }

    pub fn set(&self, body: &str) {
        *self.body.lock() = body.to_string();
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock()
    }
}

impl VersionSource for StaticSource {
    fn fetch(&self, request: &LookupRequest) -> Result<String> {
        *self.fetches.lock() += 1;
        let body = self.body.lock().clone();
        if body.is_empty() {
            return Err(RwError::source(&request.service_id, "unreachable"));
        }
        Ok(body)
    }
}

/// Records every delivery; fails them all while `failing` is set.
#[derive(Default)]
pub struct RecordingDelivery {
    pub sent: Mutex<Vec<(String, Message)>>,
    pub failing: Mutex<bool>,
}

impl RecordingDelivery {
    pub fn targets(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(id, _)| id.clone()).collect()
    }
}

impl Deliver for RecordingDelivery {
    fn send(
        &self,
        target: &DeliveryTarget,
        message: &Message,
    ) -> std::result::Result<(), DeliveryError> {
        self.sent.lock().push((target.id.clone(), message.clone()));
        if *self.failing.lock() {
            return Err(DeliveryError::Transport {
                details: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRunner {
    pub runs: Mutex<Vec<Vec<String>>>,
}

impl CommandRunner for RecordingRunner {
    fn run(&self, argv: &[String]) -> std::result::Result<(), CommandError> {
        self.runs.lock().push(argv.to_vec());
        Ok(())
    }
}

pub struct Fakes {
    pub source: Arc<StaticSource>,
    pub delivery: Arc<RecordingDelivery>,
    pub runner: Arc<RecordingRunner>,
}

impl Fakes {
    pub fn new(body: &str) -> Self {
        Self {
            source: StaticSource::new(body),
            delivery: Arc::new(RecordingDelivery::default()),
            runner: Arc::new(RecordingRunner::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            deliver: self.delivery.clone(),
            runner: self.runner.clone(),
        }
    }
}
