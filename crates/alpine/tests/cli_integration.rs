//! CLI integration tests for the Alpine command-line interface.
//!
//! These run without network access or credentials: they cover argument
//! parsing, configuration inspection and the failure paths taken before
//! any upstream service is contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const SECRET_VARS: [&str; 5] = [
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "SKITOUR_API_TOKEN",
    "METEO_FRANCE_API_TOKEN",
    "GOOGLE_MAPS_API_KEY",
];

/// A command for the alpine binary, isolated from the user's config,
/// the working directory and any credentials in the environment.
fn alpine(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("alpine").unwrap();
    cmd.current_dir(home)
        .env("ALPINE_CONFIG_DIR", home.join("config"))
        .env_remove("ALPINE_CONFIG")
        .env_remove("RUST_LOG");
    for var in SECRET_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Write a config file with file logging off and return its path.
fn write_config(home: &Path, extra: &str) -> String {
    let path = home.join("test.toml");
    std::fs::write(&path, format!("[logging]\nfile = false\n\n{extra}")).unwrap();
    path.display().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let home = TempDir::new().unwrap();
    alpine(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ski touring itinerary advisor"));
}

#[test]
fn test_version_displays() {
    let home = TempDir::new().unwrap();
    alpine(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpine"));
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    alpine(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("ranges"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_ranges_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    alpine(home.path())
        .args(["ranges", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("near"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("check"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Validation Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_requires_query() {
    let home = TempDir::new().unwrap();
    alpine(home.path())
        .arg("ask")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_invalid_language_rejected() {
    let home = TempDir::new().unwrap();
    alpine(home.path())
        .args(["--language", "klingon", "config", "path"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported language"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    let home = TempDir::new().unwrap();
    alpine(home.path()).arg("teleport").assert().failure();
}

#[test]
fn test_missing_explicit_config_fails() {
    let home = TempDir::new().unwrap();
    alpine(home.path())
        .args(["--config", "does-not-exist.toml", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.toml"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_uses_config_dir_env() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), "");
    let expected = home.path().join("config").join("config.toml");
    alpine(home.path())
        .args(["--config", &config, "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn test_config_show_masks_api_keys() {
    let home = TempDir::new().unwrap();
    let config = write_config(
        home.path(),
        "[llm]\napi_key = \"sk-very-secret\"\n\n[services.catalog]\napi_key = \"tok-secret\"\n",
    );
    alpine(home.path())
        .args(["--config", &config, "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("sk-very-secret").not())
        .stdout(predicate::str::contains("tok-secret").not());
}

#[test]
fn test_config_show_json() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), "[agent]\nmax_steps = 4\n");
    let output = alpine(home.path())
        .args(["--json", "--config", &config, "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["config"]["agent"]["max_steps"], 4);
    assert!(value["sources"].as_array().unwrap().len() == 1);
}

#[test]
fn test_project_config_is_discovered() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("alpine.toml"),
        "[logging]\nfile = false\n\n[agent]\nmax_steps = 7\n",
    )
    .unwrap();
    alpine(home.path())
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpine.toml"))
        .stdout(predicate::str::contains("1 config file(s) loaded."));
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_without_credentials_lists_env_vars() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), "");
    alpine(home.path())
        .args(["--config", &config, "ask", "a", "route", "near", "Chamonix"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing credentials"))
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"))
        .stderr(predicate::str::contains("SKITOUR_API_TOKEN"))
        .stderr(predicate::str::contains("METEO_FRANCE_API_TOKEN"))
        .stderr(predicate::str::contains("GOOGLE_MAPS_API_KEY"));
}

#[test]
fn test_ranges_near_without_geocoder_key_fails() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), "");
    alpine(home.path())
        .args(["--config", &config, "ranges", "near", "Chamonix"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GOOGLE_MAPS_API_KEY"));
}
