//! Command-line tests against a throwaway home directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Nothing listens on the discard port, so every request fails fast.
const UNREACHABLE: &str = "http://127.0.0.1:9";

fn cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("campus-market").unwrap();
    cmd.env("HOME", home.path())
        .env("CAMPUS_MARKET_BACKEND_URL", UNREACHABLE)
        .env_remove("CAMPUS_MARKET_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn json(home: &TempDir, args: &[&str]) -> Value {
    let out = cmd(home).args(["-o", "json"]).args(args).output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

fn add_desk(home: &TempDir) {
    cmd(home)
        .args(["sync", "add", "listing", "create", "-p", r#"{"title":"Desk","price":40}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued listing/create"));
}

#[test]
fn test_status_on_fresh_home() {
    let home = TempDir::new().unwrap();

    let status = json(&home, &["sync", "status"]);
    assert_eq!(status["pending"], 0);
    assert_eq!(status["storage_key"], "campus-market.offline-queue");
    assert!(status["oldest_enqueued_at"].is_null());
}

#[test]
fn test_add_then_status_and_list() {
    let home = TempDir::new().unwrap();
    add_desk(&home);

    let status = json(&home, &["sync", "status"]);
    assert_eq!(status["pending"], 1);
    assert!(status["oldest_enqueued_at"].is_string());

    cmd(&home)
        .args(["sync", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("listing/create"));
}

#[test]
fn test_add_update_requires_id() {
    let home = TempDir::new().unwrap();

    cmd(&home)
        .args(["sync", "add", "booking", "update", "-p", r#"{"status":"cancelled"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));

    assert_eq!(json(&home, &["sync", "status"])["pending"], 0);
}

#[test]
fn test_add_rejects_malformed_payload() {
    let home = TempDir::new().unwrap();

    cmd(&home)
        .args(["sync", "add", "listing", "create", "-p", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_run_while_offline_keeps_queue() {
    let home = TempDir::new().unwrap();
    add_desk(&home);

    let report = json(&home, &["sync", "run"]);
    assert_eq!(report["outcome"], "offline");
    assert_eq!(report["applied"], 0);

    assert_eq!(json(&home, &["sync", "status"])["pending"], 1);
}

#[test]
fn test_dry_run_lists_requests() {
    let home = TempDir::new().unwrap();
    add_desk(&home);

    let planned = json(&home, &["sync", "run", "--dry-run"]);
    assert_eq!(planned[0]["method"], "POST");
    assert_eq!(planned[0]["url"], "http://127.0.0.1:9/rest/v1/listings");
    assert_eq!(planned[0]["body"]["title"], "Desk");
}

#[test]
fn test_discard_removes_entry() {
    let home = TempDir::new().unwrap();
    add_desk(&home);

    cmd(&home)
        .args(["sync", "discard", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Discarded listing/create"));
    assert_eq!(json(&home, &["sync", "status"])["pending"], 0);

    cmd(&home).args(["sync", "discard", "0"]).assert().failure();
}

#[test]
fn test_clear_requires_force() {
    let home = TempDir::new().unwrap();
    add_desk(&home);
    add_desk(&home);

    cmd(&home)
        .args(["sync", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert_eq!(json(&home, &["sync", "status"])["pending"], 2);

    let cleared = json(&home, &["sync", "clear", "--force"]);
    assert_eq!(cleared["cleared"], 2);
    assert_eq!(json(&home, &["sync", "status"])["pending"], 0);
}

#[test]
fn test_config_file_sets_storage_key() {
    let home = TempDir::new().unwrap();
    let root = home.path().join(".campus-market");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("config.yaml"), "sync:\n  storage_key: other-queue\n").unwrap();

    add_desk(&home);
    let status = json(&home, &["sync", "status"]);
    assert_eq!(status["storage_key"], "other-queue");
    assert_eq!(status["pending"], 1);
}

#[test]
fn test_zero_drain_interval_is_a_config_error() {
    let home = TempDir::new().unwrap();
    let root = home.path().join(".campus-market");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("config.yaml"), "sync:\n  drain_interval_secs: 0\n").unwrap();

    cmd(&home)
        .args(["sync", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync.drain_interval_secs must be greater than 0"));
}

#[test]
fn test_completions() {
    let home = TempDir::new().unwrap();

    cmd(&home)
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("campus-market"));
}
