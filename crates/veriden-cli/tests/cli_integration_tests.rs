//! CLI integration tests for veriden
//!
//! Tests the veriden CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn veriden_cmd() -> Command {
    Command::cargo_bin("veriden").unwrap()
}

#[test]
fn test_help_lists_subcommands() {
    veriden_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("descriptor"))
        .stdout(predicate::str::contains("license"));
}

#[test]
fn test_config_show_prints_defaults() {
    let temp_dir = TempDir::new().unwrap();
    veriden_cmd()
        .env("VERIDEN_CONFIG_DIR", temp_dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_plugins"));
}

#[test]
fn test_descriptor_validate_accepts_valid_file() {
    let temp_dir = TempDir::new().unwrap();
    let descriptor_path = temp_dir.path().join("descriptor.json");
    std::fs::write(
        &descriptor_path,
        r#"{"name": "qr-share", "version": "1.0.0", "type": "utility"}"#,
    )
    .unwrap();

    veriden_cmd()
        .args(["descriptor", "validate"])
        .arg(&descriptor_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_descriptor_validate_rejects_missing_name() {
    let temp_dir = TempDir::new().unwrap();
    let descriptor_path = temp_dir.path().join("descriptor.json");
    std::fs::write(
        &descriptor_path,
        r#"{"name": "", "version": "1.0.0", "type": "utility"}"#,
    )
    .unwrap();

    veriden_cmd()
        .args(["descriptor", "validate"])
        .arg(&descriptor_path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Descriptor name is required"));
}

#[test]
fn test_license_inspect_reports_missing_record() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("licenses.json");
    std::fs::write(&cache_path, "{}").unwrap();

    veriden_cmd()
        .args(["license", "inspect"])
        .arg(&cache_path)
        .args(["unknown-plugin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No cached license"));
}
