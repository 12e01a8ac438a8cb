//! Integration smoke tests for the `rwatch` CLI surface.

use tempfile::TempDir;

mod common;

const VALID: &str = r#"
[service.argus.latest_version]
type = "github"
url = "release-argus/argus"

[service.parked.options]
active = false

[service.parked.latest_version]
type = "url"
url = "https://example.com/parked"
"#;

const INVALID: &str = r#"
[service.argus.latest_version]
type = "github"
url = "release-argus/argus"

[service.broken.latest_version]
type = "url"
url = "https://example.com"
url_commands = [{ type = "regex" }]
"#;

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: rwatch [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["--version"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("rwatch"),
        "missing version output; log: {}",
        result.log_path.display()
    );
}

#[test]
fn check_accepts_valid_config() {
    let dir = TempDir::new().unwrap();
    let path = common::write_config(dir.path(), VALID);
    let config = path.to_str().unwrap();
    let result = common::run_cli_case("check_accepts_valid_config", &["check", "-c", config]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Units: 2 ok, 0 excluded")
            && result.stdout.contains("Configuration is valid."),
        "unexpected report; log: {}",
        result.log_path.display()
    );
}

#[test]
fn check_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let path = common::write_config(dir.path(), INVALID);
    let config = path.to_str().unwrap();
    let result = common::run_cli_case("check_rejects_invalid_config", &["check", "-c", config]);
    assert!(
        !result.status.success(),
        "expected failure; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("broken:") && result.stdout.contains("regex: <required>"),
        "missing validation tree; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stderr.contains("RW-1004"),
        "missing error code; log: {}",
        result.log_path.display()
    );
}

#[test]
fn check_json_mode_outputs_structured_payload() {
    let dir = TempDir::new().unwrap();
    let path = common::write_config(dir.path(), INVALID);
    let config = path.to_str().unwrap();
    let result = common::run_cli_case(
        "check_json_mode_outputs_structured_payload",
        &["--json", "check", "-c", config],
    );
    let payload: serde_json::Value = serde_json::from_str(&result.stdout)
        .unwrap_or_else(|err| panic!("bad JSON ({err}); log: {}", result.log_path.display()));
    assert_eq!(payload["units"], serde_json::json!(["argus"]));
    assert_eq!(payload["excluded"], serde_json::json!(["broken"]));
}

#[test]
fn missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nope.toml");
    let result = common::run_cli_case(
        "missing_config_is_reported",
        &["check", "-c", config.to_str().unwrap()],
    );
    assert!(
        !result.status.success() && result.stderr.contains("RW-1002"),
        "expected missing-config error; log: {}",
        result.log_path.display()
    );
}

#[test]
fn filter_prints_pipeline_output() {
    let result = common::run_cli_case(
        "filter_prints_pipeline_output",
        &[
            "filter",
            "--commands",
            r#"[{"type":"regex","regex":"v([0-9.]+)"}]"#,
            "--text",
            "argus v0.18.0 released",
        ],
    );
    assert!(
        result.status.success() && result.stdout.trim() == "0.18.0",
        "unexpected filter output; log: {}",
        result.log_path.display()
    );
}

#[test]
fn filter_json_reports_miss() {
    let result = common::run_cli_case(
        "filter_json_reports_miss",
        &[
            "--json",
            "filter",
            "--commands",
            r#"[{"type":"split","text":"/"}]"#,
            "--text",
            "no-separator",
        ],
    );
    let payload: serde_json::Value = serde_json::from_str(&result.stdout)
        .unwrap_or_else(|err| panic!("bad JSON ({err}); log: {}", result.log_path.display()));
    assert_eq!(payload["matched"], serde_json::json!(false));
    assert_eq!(payload["text"], serde_json::json!("no-separator"));
}

#[test]
fn once_skips_inactive_units() {
    let dir = TempDir::new().unwrap();
    let path = common::write_config(
        dir.path(),
        r#"
[service.parked.options]
active = false

[service.parked.latest_version]
type = "url"
url = "https://example.com/parked"
"#,
    );
    let result = common::run_cli_case(
        "once_skips_inactive_units",
        &["once", "-c", path.to_str().unwrap()],
    );
    assert!(
        result.status.success()
            && result.stdout.contains("[SKIP] parked")
            && result.stdout.contains("All 1 steps passed."),
        "unexpected once report; log: {}",
        result.log_path.display()
    );
}

#[test]
fn once_rejects_unknown_service() {
    let dir = TempDir::new().unwrap();
    let path = common::write_config(dir.path(), VALID);
    let result = common::run_cli_case(
        "once_rejects_unknown_service",
        &["once", "-c", path.to_str().unwrap(), "--service", "ghost"],
    );
    assert!(
        !result.status.success() && result.stderr.contains("RW-1101"),
        "expected unknown-service error; log: {}",
        result.log_path.display()
    );
}
