//! Binary behavior: exit codes and the files each command leaves behind.

mod common;

use assert_cmd::Command;
use common::{usage_line, TestEnv};
use predicates::prelude::*;
use std::fs;

const ENV_OVERRIDES: &[&str] = &[
    "RUST_LOG",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "LOG_OUTPUT",
    "SESSION_MONITOR_LOG_PATH",
    "SESSION_MONITOR_OUTPUT_DIR",
    "SESSION_MONITOR_STATE_FILE",
    "SESSION_MONITOR_REFRESH_SECS",
    "SESSION_MONITOR_MAX_ROTATED",
    "SESSION_MONITOR_MISSING_SESSION",
];

fn cli(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("agent-session-monitor").unwrap();
    cmd.current_dir(env.dir.path())
        .env("NO_COLOR", "1")
        .arg("--log-path")
        .arg(&env.log_path)
        .arg("--output-dir")
        .arg(&env.output_dir);
    for var in ENV_OVERRIDES {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_ingest_writes_sessions_and_state() {
    let env = TestEnv::new();
    env.write_log(&(usage_line("s1", "GPT-4", 100, 50) + &usage_line("s2", "Qwen", 10, 5)));

    cli(&env)
        .arg("ingest")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total Sessions:  2"));

    assert!(env.output_dir.join("s1.json").is_file());
    assert!(env.output_dir.join("s2.json").is_file());
    assert!(env.output_dir.join(".state.json").is_file());

    // Second run reads nothing new.
    cli(&env)
        .arg("ingest")
        .assert()
        .success()
        .stdout(predicate::str::contains("No new content"));
}

#[test]
fn test_uncreatable_output_dir_exits_with_error() {
    let env = TestEnv::new();
    let blocker = env.dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();

    Command::cargo_bin("agent-session-monitor")
        .unwrap()
        .current_dir(env.dir.path())
        .env_remove("SESSION_MONITOR_OUTPUT_DIR")
        .arg("--log-path")
        .arg(&env.log_path)
        .arg("--output-dir")
        .arg(blocker.join("sessions"))
        .arg("ingest")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to create session directory"));
}

#[test]
fn test_query_commands_require_data_dir() {
    let env = TestEnv::new();
    for args in [vec!["list"], vec!["stats-model"], vec!["stats-date"], vec!["show", "s1"]] {
        cli(&env)
            .args(&args)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Session data directory not found"));
    }
}

#[test]
fn test_show_and_list_after_ingest() {
    let env = TestEnv::new();
    env.write_log(&usage_line("agent:main:discord:channel:1", "GPT-4", 100, 50));
    cli(&env).arg("ingest").assert().success();

    cli(&env)
        .args(["show", "agent:main:discord:channel:1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Messages: 1"))
        .stdout(predicate::str::contains("Round 1"));

    cli(&env)
        .args(["show", "agent:main:discord:channel:1", "--no-messages"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Round 1").not());

    cli(&env)
        .args(["list", "--sort-by", "cost", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("showing 1 of 1"));
}

#[test]
fn test_csv_export() {
    let env = TestEnv::new();
    env.write_log(&usage_line("s1", "GPT-4", 100, 50));
    cli(&env).arg("ingest").assert().success();

    let target = env.dir.path().join("report");
    cli(&env)
        .args(["export", "--format", "csv"])
        .arg(&target)
        .assert()
        .success();

    assert!(env.dir.path().join("report.model.csv").is_file());
    assert!(env.dir.path().join("report.date.csv").is_file());
}

#[test]
fn test_invalid_refresh_interval_rejected() {
    let env = TestEnv::new();
    cli(&env)
        .args(["--refresh-interval", "0", "ingest"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Refresh interval"));
}

#[test]
fn test_stats_date_rejects_non_positive_days() {
    let env = TestEnv::new();
    env.write_log(&usage_line("s1", "GPT-4", 100, 50));
    cli(&env).arg("ingest").assert().success();

    for days in ["0", "-3"] {
        cli(&env)
            .arg("stats-date")
            .arg(format!("--days={}", days))
            .assert()
            .failure()
            .stderr(predicate::str::contains("--days"));
    }

    cli(&env)
        .args(["stats-date", "--days", "200000000"])
        .assert()
        .success();
}
