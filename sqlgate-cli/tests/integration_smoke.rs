//! Smoke tests to verify command wiring

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_serve() {
    let mut cmd = Command::cargo_bin("sqlgate").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_serve_help_documents_flags() {
    let mut cmd = Command::cargo_bin("sqlgate").unwrap();
    cmd.arg("serve").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--database-url"))
        .stdout(predicate::str::contains("--max-connections"))
        .stdout(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_serve_requires_database_url() {
    // Run from an empty directory so no .env supplies DATABASE_URL
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("sqlgate").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("DATABASE_URL")
        .env("HOME", dir.path())
        .arg("serve");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--database-url"));
}

#[test]
fn test_serve_rejects_malformed_database_url() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("sqlgate").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .arg("serve")
        .arg("--database-url")
        .arg("not a url");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid DATABASE_URL"));
}
