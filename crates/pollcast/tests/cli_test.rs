//! Integration tests for the `pollcast` binary.
//!
//! Argument parsing, config inspection and startup failures, all without a
//! live store or broker.
#![allow(clippy::unwrap_used)]

use std::net::TcpListener;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// A `pollcast` command isolated from the user's config and environment.
fn pollcast_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("pollcast");
    cmd.env("HOME", "/tmp/pollcast-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/pollcast-cli-test-nonexistent")
        .env_remove("POLLCAST_CONFIG")
        .env_remove("SUPABASE_URL")
        .env_remove("SUPABASE_SERVICE_KEY")
        .env_remove("LS_HOST")
        .env_remove("LS_PORT")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// A loopback port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = pollcast_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    pollcast_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("config"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn test_version_flag() {
    pollcast_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pollcast"));
}

#[test]
fn test_completions_bash() {
    pollcast_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_invalid_log_format_is_usage_error() {
    pollcast_cmd()
        .args(["--log-format", "xml", "config", "path"])
        .assert()
        .code(2);
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag_and_env() {
    pollcast_cmd()
        .args(["--config", "/srv/pollcast.toml", "config", "path"])
        .assert()
        .success()
        .stdout("/srv/pollcast.toml\n");

    pollcast_cmd()
        .env("POLLCAST_CONFIG", "/etc/pollcast/config.toml")
        .args(["config", "path"])
        .assert()
        .success()
        .stdout("/etc/pollcast/config.toml\n");
}

#[test]
fn test_config_show_redacts_service_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [store]
        url = "https://abc.supabase.co"
        service_key = "super-secret-key"
        "#,
    );

    pollcast_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .env("LS_PORT", "7001")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("https://abc.supabase.co")
                .and(predicate::str::contains("port = 7001"))
                .and(predicate::str::contains("interval_ms = 500"))
                .and(predicate::str::contains("super-secret-key").not()),
        );
}

#[test]
fn test_config_check_reports_missing_url() {
    let output = pollcast_cmd()
        .args(["--config", "/tmp/pollcast-cli-test-nonexistent/none.toml"])
        .args(["config", "check"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("store.url"), "unexpected output:\n{text}");
    assert!(text.contains("SUPABASE_URL"), "unexpected output:\n{text}");
}

#[test]
fn test_config_check_accepts_env_only_setup() {
    pollcast_cmd()
        .args(["--config", "/tmp/pollcast-cli-test-nonexistent/none.toml"])
        .args(["config", "check"])
        .env("SUPABASE_URL", "https://abc.supabase.co")
        .env("SUPABASE_SERVICE_KEY", "key")
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration OK"));
}

#[test]
fn test_config_check_rejects_bad_factor() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [store]
        url = "https://abc.supabase.co"
        service_key = "key"

        [reconnect]
        factor = 0.5
        "#,
    );

    pollcast_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("reconnect.factor"));
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_without_store_settings_fails_fast() {
    pollcast_cmd()
        .args(["--config", "/tmp/pollcast-cli-test-nonexistent/none.toml", "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("store.url"));
}

#[test]
fn test_run_exits_when_broker_unreachable() {
    let dir = TempDir::new().unwrap();
    let port = closed_port();
    let path = write_config(
        &dir,
        &format!(
            r#"
            [broker]
            host = "127.0.0.1"
            port = {port}
            connect_timeout_secs = 1

            [store]
            url = "https://abc.supabase.co"
            service_key = "key"

            [reconnect]
            initial_delay_ms = 10
            max_attempts = 2
            "#
        ),
    );
    pollcast_cmd()
        .arg("--config")
        .arg(&path)
        .arg("run")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(7)
        .stderr(predicate::str::contains("unreachable after 2 attempts"));
}
