//! Binary smoke tests for the `soba` CLI.
//!
//! These run the compiled binary against a temp state directory and verify
//! each subcommand's surface behavior without touching GitHub or tmux.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn soba() -> Command {
    Command::cargo_bin("soba").unwrap()
}

fn temp_state_dir_with_config(repository: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.yml"),
        format!("github:\n  repository: {repository}\n"),
    )
    .unwrap();
    dir
}

// ── Binary builds and responds ───────────────────────────────────────────────

#[test]
fn version_flag() {
    soba()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("soba "));
}

#[test]
fn help_lists_subcommands() {
    let output = soba().arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in &["init", "start", "stop", "status", "open", "config"] {
        assert!(stdout.contains(cmd), "help missing subcommand {cmd}");
    }
}

// ── init ─────────────────────────────────────────────────────────────────────

#[test]
fn init_writes_default_config() {
    let dir = TempDir::new().unwrap();
    soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yml"));

    let config = fs::read_to_string(dir.path().join("config.yml")).unwrap();
    assert!(config.contains("repository: owner/name"));
    assert!(dir.path().join("logs").is_dir());
}

#[test]
fn init_is_idempotent_on_existing_config() {
    let dir = temp_state_dir_with_config("owner/name");
    soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Config exists"));
}

// ── config ───────────────────────────────────────────────────────────────────

#[test]
fn config_prints_effective_configuration() {
    let dir = temp_state_dir_with_config("acme/widgets");
    soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("acme/widgets"))
        .stdout(predicate::str::contains("interval: 20"));
}

#[test]
fn config_without_init_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("soba init"));
}

#[test]
fn config_rejects_malformed_repository() {
    let dir = temp_state_dir_with_config("no-slash");
    soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .arg("config")
        .assert()
        .failure();
}

// ── status ───────────────────────────────────────────────────────────────────

#[test]
fn status_exits_one_when_stopped() {
    let dir = TempDir::new().unwrap();
    soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .arg("status")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("stopped"));
}

#[test]
fn status_json_reports_not_running() {
    let dir = TempDir::new().unwrap();
    let output = soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    let doc: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status --json emits JSON");
    assert_eq!(doc["running"], serde_json::json!(false));
}

// ── stop ─────────────────────────────────────────────────────────────────────

#[test]
fn stop_without_daemon_fails() {
    let dir = TempDir::new().unwrap();
    soba()
        .args(["--state-dir"])
        .arg(dir.path())
        .arg("stop")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not running"));
}
