//! Integration tests for the ojsandbox CLI.
//!
//! These run the actual binary and check output and exit codes. None of them
//! need a Docker daemon.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

// -----------------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------------

/// Creates a Command for the ojsandbox binary.
#[allow(deprecated)]
fn ojsandbox() -> Command {
    Command::cargo_bin("ojsandbox").expect("failed to find ojsandbox binary")
}

/// Creates a Command for ojsandbox running in a specific directory.
fn ojsandbox_in(dir: &TempDir) -> Command {
    let mut cmd = ojsandbox();
    cmd.current_dir(dir.path()).env_remove("OJSANDBOX_AUTH_SECRET");
    cmd
}

// -----------------------------------------------------------------------------
// Help and version tests
// -----------------------------------------------------------------------------

#[test]
fn test_help_shows_all_commands() {
    ojsandbox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ojsandbox"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("submit"))
        .stdout(predicate::str::contains("image"))
        .stdout(predicate::str::contains("prune"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_shows_version() {
    ojsandbox()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ojsandbox"));
}

#[test]
fn test_submit_help_shows_flags() {
    ojsandbox()
        .args(["submit", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--language"))
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--file-input"))
        .stdout(predicate::str::contains("--expected"));
}

#[test]
fn test_image_help_shows_actions() {
    ojsandbox()
        .args(["image", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pull"))
        .stdout(predicate::str::contains("status"));
}

// -----------------------------------------------------------------------------
// Config tests
// -----------------------------------------------------------------------------

#[test]
fn test_config_prints_defaults() {
    let dir = TempDir::new().unwrap();

    ojsandbox_in(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[server]"))
        .stdout(predicate::str::contains("0.0.0.0:8090"))
        .stdout(predicate::str::contains("eclipse-temurin:17-jdk"))
        .stdout(predicate::str::contains("secretKey").not());
}

#[test]
fn test_config_reads_local_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ojsandbox.toml"),
        "[server]\nbind = \"127.0.0.1:9999\"\n\n[languages.python]\nimage = \"python:3.12-alpine\"\n",
    )
    .unwrap();

    ojsandbox_in(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("127.0.0.1:9999"))
        .stdout(predicate::str::contains("python:3.12-alpine"))
        .stdout(predicate::str::contains("node:20-slim"));
}

#[test]
fn test_explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();

    ojsandbox_in(&dir)
        .args(["--config", "missing.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ojsandbox.toml"),
        "[sandbox]\nmemory = \"lots\"\n",
    )
    .unwrap();

    ojsandbox_in(&dir)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config file"));
}

// -----------------------------------------------------------------------------
// Submit tests
// -----------------------------------------------------------------------------

#[test]
fn test_submit_missing_file_fails() {
    let dir = TempDir::new().unwrap();

    ojsandbox_in(&dir)
        .args(["submit", "nope.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read source file"));
}

#[test]
fn test_submit_unknown_extension_needs_language() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("solution.txt"), "print(1)").unwrap();

    ojsandbox_in(&dir)
        .args(["submit", "solution.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass --language"));
}

#[test]
fn test_submit_rejects_unknown_language() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.py"), "print(1)").unwrap();

    ojsandbox_in(&dir)
        .args(["submit", "main.py", "--language", "cobol"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported language"));
}
