//! CLI tests for argument handling.
//!
//! Spawns the clicra binary and verifies exit codes for usage errors and for
//! an unreachable model endpoint.

use std::process::Command;

use clicra::exit_codes;

fn clicra(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_clicra"));
    cmd.env("CLICRA_CONFIG", config_dir.join("config.toml"))
        .env_remove("OLLAMA_HOST")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn missing_task_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = clicra(temp.path()).output().expect("spawn clicra");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("TASK"));
}

#[test]
fn conflicting_modes_are_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = clicra(temp.path())
        .args(["--run", "--script", "list files"])
        .status()
        .expect("spawn clicra");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn help_exits_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = clicra(temp.path())
        .arg("--help")
        .output()
        .expect("spawn clicra");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--refer"));
}

#[test]
fn invalid_config_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("config.toml"), "max_chars = 0\n").expect("write config");
    let output = clicra(temp.path())
        .arg("list files")
        .output()
        .expect("spawn clicra");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_chars"));
}

#[test]
fn unreachable_endpoint_aborts() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("config.toml"),
        "endpoint = \"http://127.0.0.1:9\"\nrequest_timeout_secs = 5\n",
    )
    .expect("write config");
    let output = clicra(temp.path())
        .args(["--run", "list files"])
        .output()
        .expect("spawn clicra");
    assert_eq!(output.status.code(), Some(exit_codes::ABORTED));
}
