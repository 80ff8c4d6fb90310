//! End-to-end CLI tests for the archiver binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Builds a command isolated from any real config file on the host.
fn archiver(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("archiver").unwrap();
    cmd.env("XDG_CONFIG_HOME", temp.path().join("config"));
    cmd.env("HOME", temp.path());
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let temp = TempDir::new().unwrap();
    archiver(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch retrieval and reconciliation"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let temp = TempDir::new().unwrap();
    archiver(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("archiver"));
}

/// Test that invoking with no subcommand shows usage and fails.
#[test]
fn test_binary_requires_subcommand() {
    let temp = TempDir::new().unwrap();
    archiver(&temp)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let temp = TempDir::new().unwrap();
    archiver(&temp)
        .args(["run", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Import reads a backlog file and reports what it added.
#[test]
fn test_import_then_status_round_trip() {
    let temp = TempDir::new().unwrap();
    let backlog = temp.path().join("clients.csv");
    std::fs::write(
        &backlog,
        "Client Name,Client Number,Email\nAcme Co,1042,acme@example.com\n\"Beta, LLC\",2001\n",
    )
    .unwrap();
    let db = temp.path().join("ledger.db");

    archiver(&temp)
        .args(["--database", db.to_str().unwrap(), "import"])
        .arg(&backlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("added = 2"));

    // Importing again adds nothing.
    archiver(&temp)
        .args(["--database", db.to_str().unwrap(), "import"])
        .arg(&backlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("added = 0"))
        .stdout(predicate::str::contains("already_present = 2"));

    archiver(&temp)
        .args(["--database", db.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending = 2"));

    archiver(&temp)
        .args(["--database", db.to_str().unwrap(), "status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pending\": 2"));
}

/// Import skips lines without a name and number.
#[test]
fn test_import_reports_invalid_lines() {
    let temp = TempDir::new().unwrap();
    let backlog = temp.path().join("clients.csv");
    std::fs::write(&backlog, "Acme Co,1042\nOnlyOneField\n").unwrap();
    let db = temp.path().join("ledger.db");

    archiver(&temp)
        .args(["--database", db.to_str().unwrap(), "import"])
        .arg(&backlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("added = 1"))
        .stdout(predicate::str::contains("invalid = 1"));
}

/// Import of a missing file fails with a readable error.
#[test]
fn test_import_missing_file_fails() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("ledger.db");

    archiver(&temp)
        .args(["--database", db.to_str().unwrap(), "import", "no-such-file.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read backlog file"));
}

/// Run with an empty backlog exits cleanly without prompting.
#[test]
fn test_run_with_empty_backlog_succeeds() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("ledger.db");
    let root = temp.path().join("archive");

    archiver(&temp)
        .args([
            "--database",
            db.to_str().unwrap(),
            "--root",
            root.to_str().unwrap(),
            "run",
        ])
        .assert()
        .success();
}

/// Status on a fresh database reports an empty backlog.
#[test]
fn test_status_on_fresh_database() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("ledger.db");

    archiver(&temp)
        .args(["--database", db.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backlog is empty"));
}
