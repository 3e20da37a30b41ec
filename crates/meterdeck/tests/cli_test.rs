//! Integration tests for the `meterdeck` CLI binary.
//!
//! Argument parsing, help output, shell completions and config handling
//! run without a backend; the meter commands run against a wiremock one.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KONTOR: &str = "aa:bb:cc:00:00:a1";
const UNNAMED: &str = "aa:bb:cc:00:00:c3";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `meterdeck` binary with env isolation.
///
/// Clears all `METERDECK_*` env vars and points the config file at a
/// path inside `dir` so tests never touch the user's real configuration.
fn meterdeck_cmd(dir: &tempfile::TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("meterdeck");
    cmd.env("METERDECK_CONFIG", dir.path().join("config.toml"))
        .env("NO_COLOR", "1")
        .env_remove("METERDECK_PROFILE")
        .env_remove("METERDECK_BACKEND")
        .env_remove("METERDECK_OUTPUT")
        .env_remove("METERDECK_TIMEOUT")
        .env_remove("METERDECK_DELETE_CODE")
        .env_remove("RUST_LOG")
        .write_stdin("");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

async fn backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "db_connected": true,
            "mqtt_connected": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/meters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"mac": KONTOR, "name": "Kontor", "number": 1, "status": "online",
             "lastReading": 120.5},
            {"mac": "aa:bb:cc:00:00:b2", "name": "Køkken", "number": "002",
             "status": "offline"},
            {"mac": UNNAMED, "name": "Unavngivet", "number": null, "status": "online"}
        ])))
        .mount(&server)
        .await;
    server
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir).arg("--help").assert().success().stdout(
        predicate::str::contains("metered power outlets")
            .and(predicate::str::contains("meters"))
            .and(predicate::str::contains("scan"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("meterdeck"));
}

#[test]
fn test_meters_subcommands_exist() {
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["meters", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("readings"))
                .and(predicate::str::contains("daily"))
                .and(predicate::str::contains("delete"))
                .and(predicate::str::contains("off")),
        );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_env() {
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().join("config.toml");
    meterdeck_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn test_config_show_no_config() {
    // `config show` falls back to the default config when no file exists.
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_profile"));
}

#[test]
fn test_config_show_reads_profiles() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "default_profile = \"hjem\"\n\n[profiles.hjem]\nbackend = \"http://192.168.1.50:5000\"\n",
    )
    .unwrap();
    meterdeck_cmd(&dir)
        .args(["--output", "plain", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hjem"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_meters_list_no_backend() {
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["meters", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No backend configured"));
}

#[test]
fn test_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["--profile", "sommerhus", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sommerhus"));
}

#[test]
fn test_invalid_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir)
        .args(["--output", "invalid", "meters", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

#[test]
fn test_unreachable_backend_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir)
        .args(["--backend", "http://127.0.0.1:1", "--timeout", "2", "status"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7), "{}", combined_output(&output));
}

// ── Against a backend ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_meters_list_hides_unnamed() {
    let server = backend().await;
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir)
        .args(["--backend", &server.uri(), "-o", "plain", "meters", "list"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(KONTOR));
    assert!(stdout.contains("aa:bb:cc:00:00:b2"));
    assert!(!stdout.contains(UNNAMED));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_meters_list_active_search_as_json() {
    let server = backend().await;
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir)
        .args([
            "--backend",
            &server.uri(),
            "-o",
            "json",
            "meters",
            "list",
            "--active",
            "--search",
            "KONT",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let meters: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let meters = meters.as_array().unwrap();
    assert_eq!(meters.len(), 1);
    assert_eq!(meters[0]["mac"], KONTOR);
    assert_eq!(meters[0]["number"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_reports_counts() {
    let server = backend().await;
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir)
        .args(["--backend", &server.uri(), "-o", "json-compact", "status"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["database_connected"], true);
    assert_eq!(report["mqtt_connected"], false);
    assert_eq!(report["meters"], 3);
    assert_eq!(report["named"], 2);
    assert_eq!(report["online"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_with_wrong_code_exits_rejected() {
    let server = backend().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/api/meters/{KONTOR}")))
        .and(body_json(json!({"code": "0000"})))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "Ugyldig sikkerhedskode"})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir)
        .args([
            "--backend",
            &server.uri(),
            "--yes",
            "meters",
            "delete",
            KONTOR,
            "--code",
            "0000",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(5), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("Ugyldig sikkerhedskode"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_without_yes_needs_a_terminal() {
    let server = backend().await;
    let dir = tempfile::tempdir().unwrap();
    let output = meterdeck_cmd(&dir)
        .args(["--backend", &server.uri(), "meters", "delete", KONTOR, "--code", "1234"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("--yes"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_name_rejects_out_of_range_number() {
    let server = backend().await;
    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["--backend", &server.uri(), "meters", "name", KONTOR, "Kontor", "1000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("number"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_power_off_reaches_backend() {
    let server = backend().await;
    Mock::given(method("POST"))
        .and(path(format!("/api/meters/{KONTOR}/off")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Slukket"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    meterdeck_cmd(&dir)
        .args(["--backend", &server.uri(), "meters", "off", KONTOR])
        .assert()
        .success()
        .stderr(predicate::str::contains("Power off sent"));
}
