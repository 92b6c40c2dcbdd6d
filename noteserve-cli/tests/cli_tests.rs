//! End-to-end tests of the `noteserve` binary against a temporary database

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn noteserve(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_noteserve"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run noteserve")
}

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let db_path = dir.path().join("notes.db");
    let config_path = dir.path().join("noteserve.toml");
    let contents = format!(
        "[store]\ndb_path = {:?}\npool_size = 2\n\n[sync]\nfull_sync_before = 42\n",
        db_path.display().to_string()
    );
    std::fs::write(&config_path, contents).unwrap();
    config_path
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "noteserve failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_migrate_reports_schema_version() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let out = stdout(&noteserve(&config, &["migrate"]));
    assert!(out.contains("at version"), "unexpected output: {out}");
    assert!(dir.path().join("notes.db").exists());
}

#[test]
fn test_create_user_then_sync_state() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let out = stdout(&noteserve(&config, &["create-user"]));
    let user: serde_json::Value = serde_json::from_str(&out).unwrap();
    let id = user["id"].as_i64().unwrap();
    assert_eq!(user["max_usn"], 0);

    let out = stdout(&noteserve(&config, &["sync-state", "--user", &id.to_string()]));
    let state: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(state["max_usn"], 0);
    assert_eq!(state["full_sync_before"], 42);
}

#[test]
fn test_unknown_user_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = noteserve(&config, &["sync-state", "--user", "999"]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("bad.toml");
    std::fs::write(&config_path, "[sync]\ndefault_fragment_limit = 500\n").unwrap();

    let output = noteserve(&config_path, &["migrate"]);
    assert!(!output.status.success());
}
