use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PACKAGES: &str = r#"
version: "1.0"
packages:
  - id: git
    name: Git
    priority: 0
  - id: node
    name: Node.js
    dependencies: [git]
  - id: yarn
    name: Yarn
    dependencies: [node]
"#;

fn swiftinstall(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("swiftinstall").unwrap();
    // keep the user's real config out of the way
    cmd.arg("--config").arg(config_dir.join("config.yml"));
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    swiftinstall(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_check_valid_list() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "packages.yml", PACKAGES);

    swiftinstall(dir.path())
        .arg("check")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 packages OK"));
}

#[test]
fn test_check_reports_cycles_and_unknown_ids() {
    let dir = TempDir::new().unwrap();
    let list = write(
        &dir,
        "cycle.json",
        r#"{"packages": [
            {"id": "a", "name": "A", "dependencies": ["b"]},
            {"id": "b", "name": "B", "dependencies": ["a"]},
            {"id": "c", "name": "C", "dependencies": ["ghost"]}
        ]}"#,
    );

    swiftinstall(dir.path())
        .arg("check")
        .arg(&list)
        .assert()
        .failure()
        .stderr(predicate::str::contains("'c' depends on unknown package 'ghost'"))
        .stderr(predicate::str::contains("dependency cycle: a -> b -> a"));
}

#[test]
fn test_check_rejects_duplicates() {
    let dir = TempDir::new().unwrap();
    let list = write(
        &dir,
        "dup.json",
        r#"{"packages": [{"id": "a", "name": "A"}, {"id": "a", "name": "A"}]}"#,
    );

    swiftinstall(dir.path())
        .arg("check")
        .arg(&list)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate package id: a"));
}

#[test]
fn test_unknown_extension_fails() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "packages.toml", "");

    swiftinstall(dir.path())
        .arg("check")
        .arg(&list)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config format"));
}

#[test]
fn test_export_script_to_stdout() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "packages.yml", PACKAGES);

    swiftinstall(dir.path())
        .args(["export", "--script", "bash"])
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#!/bin/bash"))
        .stdout(predicate::str::contains("brew install 'node'"));
}

#[test]
fn test_export_converts_yaml_to_json() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "packages.yml", PACKAGES);
    let out = dir.path().join("packages.json");

    swiftinstall(dir.path())
        .arg("export")
        .arg(&list)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let json = fs::read_to_string(&out).unwrap();
    assert!(json.contains("\"id\": \"yarn\""));
    assert!(json.contains("\"generated\""));

    swiftinstall(dir.path())
        .arg("check")
        .arg(&out)
        .assert()
        .success();
}

#[test]
fn test_export_script_file() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "packages.yml", PACKAGES);
    let out = dir.path().join("install.ps1");

    swiftinstall(dir.path())
        .args(["export", "--script", "powershell", "-o"])
        .arg(&out)
        .arg(&list)
        .assert()
        .success();

    let script = fs::read_to_string(&out).unwrap();
    assert!(script.contains("winget install --id \"git\" --exact"));
}

#[test]
fn test_export_script_gets_default_extension() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "packages.yml", PACKAGES);

    swiftinstall(dir.path())
        .args(["export", "--script", "python", "-o"])
        .arg(dir.path().join("setup"))
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("setup.py"));

    let script = fs::read_to_string(dir.path().join("setup.py")).unwrap();
    assert!(script.starts_with("#!/usr/bin/env python3"));
}

#[test]
fn test_export_needs_a_target() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "packages.yml", PACKAGES);

    swiftinstall(dir.path())
        .arg("export")
        .arg(&list)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to export"));
}

#[test]
fn test_install_empty_list() {
    let dir = TempDir::new().unwrap();
    let list = write(&dir, "empty.json", r#"{"packages": []}"#);

    swiftinstall(dir.path())
        .arg("install")
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installation Session Report"))
        .stdout(predicate::str::contains("Total Packages: 0"));
}

#[test]
fn test_malformed_config_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, "config.yml", "max_workers: [1, 2]\n");
    let list = write(&dir, "packages.yml", PACKAGES);

    swiftinstall(dir.path())
        .arg("check")
        .arg(&list)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
