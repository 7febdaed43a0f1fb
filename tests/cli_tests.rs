use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn cli(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("commit-tasklog").unwrap();
    cmd.current_dir(dir)
        .env_remove("COMMIT_TASKLOG_CONFIG")
        .env_remove("COMMIT_TASKLOG_WEBHOOK_URL")
        .env_remove("COMMIT_TASKLOG_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("uninstall"))
        .stdout(predicate::str::contains("tasks"));
}

#[test]
fn config_prints_defaults_without_file() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("# defaults"))
        .stdout(predicate::str::contains("YOUR_DEPLOYMENT_ID"))
        .stdout(predicate::str::contains("request_timeout_secs = 10.0"));
}

#[test]
fn config_reads_file_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasklog.toml");
    fs::write(
        &path,
        "webhook_url = \"https://example.test/exec\"\ntime_input = \"free-form\"\n",
    )
    .unwrap();

    cli(dir.path())
        .arg("config")
        .env("COMMIT_TASKLOG_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("# loaded from"))
        .stdout(predicate::str::contains("https://example.test/exec"))
        .stdout(predicate::str::contains("free-form"));
}

#[test]
fn broken_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasklog.toml");
    fs::write(&path, "webhook_url = [not toml").unwrap();

    cli(dir.path())
        .arg("config")
        .env("COMMIT_TASKLOG_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("# error: invalid TOML"))
        .stdout(predicate::str::contains("YOUR_DEPLOYMENT_ID"));
}

#[test]
fn webhook_env_overrides_config_file() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .arg("config")
        .env("COMMIT_TASKLOG_WEBHOOK_URL", "https://override.test/exec")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://override.test/exec"));
}

#[test]
fn tasks_against_unreachable_webhook_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .arg("tasks")
        .env("COMMIT_TASKLOG_WEBHOOK_URL", "http://127.0.0.1:9/exec")
        .assert()
        .success()
        .stderr(predicate::str::contains("Could not load tasks"));
}

#[test]
fn install_outside_repo_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli(dir.path())
        .arg("install")
        .env("GIT_CEILING_DIRECTORIES", dir.path().parent().unwrap())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not in a git repository"));
}
