//! CLI integration tests for data-splitter.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes, and dry runs against a SQLite configuration.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the data-splitter binary.
fn cmd() -> Command {
    Command::cargo_bin("data-splitter").unwrap()
}

/// Write a SQLite config into `dir` and return its path.
fn sqlite_config(dir: &Path, extra: &str) -> String {
    let source = dir.join("shop.db");
    let yaml = format!(
        r#"
database:
  type: sqlite
  source_db: "{}"
tables:
  - name: orders
    enabled: true
    split_column: created_at
    archive_pattern: "shop_{{year}}"
  - name: invoices
    enabled: true
    split_column: issued_on
    archive_pattern: "billing_{{year}}"
archive:
  years: [2021, 2022]
{}
"#,
        source.display(),
        extra
    );
    let path = dir.join("config.yaml");
    std::fs::write(&path, yaml).unwrap();
    path.to_str().unwrap().to_string()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--year"))
        .stdout(predicate::str::contains("--resume-offset"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("data-splitter"));
}

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("--no-log-file"))
        .stdout(predicate::str::contains("--checkpoint-file"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["--config", "nonexistent_config_file.yaml", "--no-log-file", "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "--no-log-file", "validate"])
        .assert()
        .code(2);
}

#[test]
fn test_empty_config_exits_with_code_2() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "--no-log-file", "run"])
        .assert()
        .code(2);
}

#[test]
fn test_config_without_years_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path(), "");
    let content = std::fs::read_to_string(&config)
        .unwrap()
        .replace("years: [2021, 2022]", "years: []");
    std::fs::write(&config, content).unwrap();

    cmd()
        .current_dir(dir.path())
        .args(["--config", &config, "--no-log-file", "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("year"));
}

#[test]
fn test_unknown_table_override_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path(), "");

    cmd()
        .current_dir(dir.path())
        .args(["--config", &config, "--no-log-file", "run", "--dry-run", "--table", "customers"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("customers"));
}

// =============================================================================
// Run Tests
// =============================================================================

#[test]
fn test_dry_run_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path(), "");

    cmd()
        .current_dir(dir.path())
        .args(["--config", &config, "--no-log-file", "run", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Dry run completed!"));

    assert!(!dir.path().join("shop.db").exists());
    assert!(!dir.path().join("shop_2021.db").exists());
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn test_dry_run_json_summary_respects_overrides() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path(), "");

    cmd()
        .current_dir(dir.path())
        .args([
            "--config",
            &config,
            "--no-log-file",
            "--output-json",
            "run",
            "--dry-run",
            "--table",
            "orders",
            "--year",
            "2023",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"dry_run\""))
        .stdout(predicate::str::contains("\"table_years_total\": 1"))
        .stdout(predicate::str::contains("\"skipped_dry_run\": 1"));
}

#[test]
fn test_missing_source_database_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path(), "");

    cmd()
        .current_dir(dir.path())
        .args(["--config", &config, "--no-log-file", "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("shop.db"));
}

#[test]
fn test_logs_go_to_log_file() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path(), "processing:\n  log_path: run.log\n");

    cmd()
        .current_dir(dir.path())
        .args(["--config", &config, "run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN").not());

    let log = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
    assert!(log.contains("[DRY RUN] Would archive orders year 2021 into shop_2021"));
    assert!(log.contains("[DRY RUN] Would archive invoices year 2022 into billing_2022"));
}

// =============================================================================
// Info Tests
// =============================================================================

#[test]
fn test_info_without_config() {
    let dir = TempDir::new().unwrap();

    cmd()
        .current_dir(dir.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Working directory:"))
        .stdout(predicate::str::contains("config.yaml (not found)"))
        .stdout(predicate::str::contains("logs/data-splitter.log"));
}

#[test]
fn test_info_reports_configured_log_path() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(dir.path(), "processing:\n  log_path: custom/archive.log\n");

    cmd()
        .current_dir(dir.path())
        .args(["--config", &config, "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom/archive.log"));
}
