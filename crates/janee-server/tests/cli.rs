// SPDX-License-Identifier: MIT OR Apache-2.0
//! janeed CLI surface: init, fatal startup errors, exit codes.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn init_creates_a_config_and_refuses_to_overwrite() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("janee");

    Command::cargo_bin("janeed")
        .unwrap()
        .args(["init", "--config-dir"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yaml"));

    let raw = std::fs::read_to_string(dir.join("config.yaml")).unwrap();
    assert!(raw.contains("masterKey"));
    assert!(raw.contains("version"));

    // Second init must not clobber the master key.
    Command::cargo_bin("janeed")
        .unwrap()
        .args(["init", "--config-dir"])
        .arg(&dir)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn serve_without_config_exits_1() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("janeed")
        .unwrap()
        .args(["serve", "--transport", "stdio", "--config-dir"])
        .arg(tmp.path().join("missing"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("config"));
}

#[test]
fn serve_with_corrupt_config_exits_1() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("janee");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.yaml"), "version: [unclosed").unwrap();

    Command::cargo_bin("janeed")
        .unwrap()
        .args(["serve", "--config-dir"])
        .arg(&dir)
        .assert()
        .failure()
        .code(1);
}
