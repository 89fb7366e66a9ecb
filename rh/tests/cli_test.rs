//! CLI smoke tests against a throwaway store

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use feedstore::FeedStore;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    temp_dir: TempDir,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = temp_dir.path().join("rsshub.yml");
        let db_path = temp_dir.path().join("data").join("rsshub.db");
        fs::write(
            &config,
            format!("log-level: warn\nstorage:\n  db-path: {}\n", db_path.display()),
        )
        .expect("Failed to write config");
        Self { temp_dir, config }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("rsshub").expect("binary should build");
        cmd.arg("--config")
            .arg(&self.config)
            .env_remove("CLI_APP_TIMER_INTERVAL")
            .env_remove("CLI_APP_WORKERS_COUNT")
            .env_remove("RUST_LOG");
        cmd
    }

    fn store(&self) -> FeedStore {
        FeedStore::open(self.temp_dir.path().join("data").join("rsshub.db")).expect("Failed to open store")
    }
}

#[test]
fn test_add_then_list_json() {
    let env = Env::new();
    env.cmd()
        .args(["add", "--name", "tech", "--url", "https://example.com/rss"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added feed"));

    env.cmd()
        .args(["list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"tech\"").and(predicate::str::contains("https://example.com/rss")));
}

#[test]
fn test_duplicate_feed_is_rejected() {
    let env = Env::new();
    env.cmd()
        .args(["add", "--name", "tech", "--url", "https://example.com/rss"])
        .assert()
        .success();
    env.cmd()
        .args(["add", "--name", "tech", "--url", "https://other.example.com/rss"])
        .assert()
        .failure();
}

#[test]
fn test_set_workers_validates_range() {
    let env = Env::new();
    env.cmd()
        .args(["set-workers", "11"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 1 and 10"));

    env.cmd().args(["set-workers", "4"]).assert().success();
    assert_eq!(env.store().worker_count().unwrap(), 4);
}

#[test]
fn test_set_interval_validates_and_persists() {
    let env = Env::new();
    env.cmd()
        .args(["set-interval", "not-a-duration"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid interval"));
    assert_eq!(env.store().interval().unwrap(), "3m");

    env.cmd().args(["set-interval", "45s"]).assert().success();
    assert_eq!(env.store().interval().unwrap(), "45s");
}

#[test]
fn test_env_overrides_seed_defaults() {
    let env = Env::new();
    env.cmd()
        .env("CLI_APP_TIMER_INTERVAL", "90s")
        .env("CLI_APP_WORKERS_COUNT", "7")
        .args(["list"])
        .assert()
        .success();

    let store = env.store();
    assert_eq!(store.interval().unwrap(), "90s");
    assert_eq!(store.worker_count().unwrap(), 7);
}

#[test]
fn test_delete_missing_feed_fails() {
    let env = Env::new();
    env.cmd().args(["delete", "--name", "ghost"]).assert().failure();
}

#[test]
fn test_articles_empty_store() {
    let env = Env::new();
    env.cmd()
        .args(["articles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No articles stored"));
}

#[test]
fn test_fetch_rejected_while_lock_held() {
    let env = Env::new();
    // Create the store and seed it, then hold the lock from this process
    env.cmd().args(["list"]).assert().success();
    let holder = env.store();
    assert!(holder.try_acquire_singleton().unwrap());

    env.cmd()
        .args(["fetch"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"));

    holder.release_singleton().unwrap();
}
