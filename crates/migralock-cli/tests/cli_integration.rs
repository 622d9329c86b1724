//! CLI subprocess integration tests.
//!
//! These tests invoke the `migralock` binary as a subprocess against scratch
//! SQLite files and check exit codes, stdout content, and JSON output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn migralock_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_migralock"));
    cmd.env_remove("MIGRALOCK_LOCK_ENABLED");
    cmd.env_remove("MIGRALOCK_LOG");
    cmd
}

fn scratch_db() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("app.db");
    (dir, db)
}

fn migralock(db: &Path, args: &[&str]) -> Output {
    migralock_bin()
        .arg("--database")
        .arg(db)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!("stdout is not JSON ({e}): {}", stdout(output));
    })
}

#[test]
fn cli_version_exits_zero() {
    let output = migralock_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("migralock"));
}

#[test]
fn cli_help_lists_commands() {
    let output = migralock_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for command in ["status", "acquire", "release", "force-release", "run"] {
        assert!(out.contains(command), "help must list '{command}': {out}");
    }
}

#[test]
fn cli_without_database_is_config_error() {
    let output = migralock_bin().arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no database given"));
}

#[test]
fn cli_bad_config_is_config_error() {
    let (dir, db) = scratch_db();
    let config = dir.path().join("migralock.toml");
    std::fs::write(&config, "[lock]\nlease = 1\n").unwrap();

    let output = migralock_bin()
        .arg("--config")
        .arg(&config)
        .arg("--database")
        .arg(&db)
        .arg("status")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_status_on_fresh_database() {
    let (_dir, db) = scratch_db();
    let output = migralock(&db, &["--json", "status"]);
    assert!(output.status.success());
    let status = json(&output);
    assert_eq!(status["enabled"], true);
    assert_eq!(status["table_exists"], false);
    assert_eq!(status["state"], "free");
}

#[test]
fn cli_acquire_then_second_acquire_reports_held() {
    let (_dir, db) = scratch_db();

    let first = migralock(&db, &["--json", "acquire"]);
    assert!(first.status.success());
    assert_eq!(json(&first)["acquired"], true);

    let second = migralock(&db, &["--json", "acquire"]);
    assert_eq!(second.status.code(), Some(2));
    let report = json(&second);
    assert_eq!(report["acquired"], false);
    assert!(report["holder"].as_str().unwrap().contains(" since "));

    let status = json(&migralock(&db, &["--json", "status"]));
    assert_eq!(status["state"], "locked");
    assert_eq!(status["locks"].as_array().unwrap().len(), 1);
}

#[test]
fn cli_release_frees_lock() {
    let (_dir, db) = scratch_db();
    assert!(migralock(&db, &["acquire"]).status.success());

    let release = migralock(&db, &["--json", "release"]);
    assert!(release.status.success());
    assert_eq!(json(&release)["outcome"], "released");

    let list = json(&migralock(&db, &["--json", "list"]));
    assert!(list.as_array().unwrap().is_empty());
    assert!(migralock(&db, &["acquire"]).status.success());
}

#[test]
fn cli_release_without_table_is_success() {
    let (_dir, db) = scratch_db();
    let output = migralock(&db, &["--json", "release"]);
    assert!(output.status.success());
    assert_eq!(json(&output)["outcome"], "table_absent");
}

#[test]
fn cli_acquire_wait_times_out_with_lock_held() {
    let (dir, db) = scratch_db();
    let config = dir.path().join("migralock.toml");
    std::fs::write(&config, "[lock]\nwait_time_secs = 0\nrecheck_time_secs = 1\n").unwrap();
    assert!(migralock(&db, &["acquire"]).status.success());

    let output = migralock_bin()
        .arg("--config")
        .arg(&config)
        .arg("--database")
        .arg(&db)
        .args(["--json", "acquire", "--wait"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let report = json(&output);
    assert_eq!(report["acquired"], false);
    assert!(report["error"].as_str().unwrap().contains("currently locked by"));
}

#[test]
fn cli_force_release_clears_foreign_lock() {
    let (_dir, db) = scratch_db();
    assert!(migralock(&db, &["acquire"]).status.success());

    let output = migralock(&db, &["--json", "force-release"]);
    assert!(output.status.success());
    assert_eq!(json(&output)["outcome"], "released");
    assert!(migralock(&db, &["acquire"]).status.success());
}

#[test]
fn cli_list_shows_holder_in_table() {
    let (dir, db) = scratch_db();
    let config = dir.path().join("migralock.toml");
    std::fs::write(&config, "[lock]\nlocked_by = \"deploy@ci\"\n").unwrap();
    let acquire = migralock_bin()
        .arg("--config")
        .arg(&config)
        .arg("--database")
        .arg(&db)
        .arg("acquire")
        .output()
        .unwrap();
    assert!(acquire.status.success());

    let output = migralock(&db, &["list"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("LOCKED_BY"));
    assert!(out.contains("deploy@ci"));
}

#[test]
fn cli_destroy_drops_table() {
    let (_dir, db) = scratch_db();
    assert!(migralock(&db, &["acquire"]).status.success());
    assert!(migralock(&db, &["destroy"]).status.success());

    let status = json(&migralock(&db, &["--json", "status"]));
    assert_eq!(status["table_exists"], false);
}

#[test]
fn cli_run_holds_lock_and_propagates_exit_code() {
    let (_dir, db) = scratch_db();

    let ok = migralock(&db, &["--json", "run", "--", "true"]);
    assert_eq!(ok.status.code(), Some(0));

    let failed = migralock(&db, &["--json", "run", "--", "sh", "-c", "exit 7"]);
    assert_eq!(failed.status.code(), Some(7));

    // The lock was released after each run.
    let list = json(&migralock(&db, &["--json", "list"]));
    assert!(list.as_array().unwrap().is_empty());
}

#[test]
fn cli_run_sees_lock_from_inside_command() {
    let (_dir, db) = scratch_db();
    let bin = env!("CARGO_BIN_EXE_migralock");
    let inner = format!("'{bin}' --database '{}' acquire", db.display());

    // The nested acquire runs while the outer run holds the lock.
    let output = migralock(&db, &["--json", "run", "--", "sh", "-c", &inner]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_run_with_missing_program_releases_lock() {
    let (_dir, db) = scratch_db();
    let output = migralock(&db, &["--json", "run", "--", "migralock-no-such-program"]);
    assert_eq!(output.status.code(), Some(1));

    let list = json(&migralock(&db, &["--json", "list"]));
    assert!(list.as_array().unwrap().is_empty());
}

#[test]
fn cli_disabled_locking_always_acquires() {
    let (_dir, db) = scratch_db();
    assert!(migralock(&db, &["acquire"]).status.success());

    let output = migralock_bin()
        .env("MIGRALOCK_LOCK_ENABLED", "false")
        .arg("--database")
        .arg(&db)
        .args(["--json", "acquire"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(json(&output)["acquired"], true);

    let status = migralock_bin()
        .env("MIGRALOCK_LOCK_ENABLED", "false")
        .arg("--database")
        .arg(&db)
        .args(["--json", "status"])
        .output()
        .unwrap();
    assert_eq!(json(&status)["state"], "disabled");
}

#[test]
fn cli_invalid_enabled_override_is_config_error() {
    let (_dir, db) = scratch_db();
    let output = migralock_bin()
        .env("MIGRALOCK_LOCK_ENABLED", "sometimes")
        .arg("--database")
        .arg(&db)
        .arg("status")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_completions_bash() {
    let output = migralock_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("migralock"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = migralock_bin()
        .arg("man-pages")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(dir.path().join("migralock.1").exists());
    assert!(dir.path().join("migralock-acquire.1").exists());
}
