//! CLI integration tests
//!
//! Drive the `tm` binary against a scratch git repository. The large-object
//! backend is switched off through the environment so no `dvc` is needed.
//! Every test returns early when git is missing.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;
use timemachine_store::RepoLock;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

fn setup_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    git(root, &["init", "-q"]);
    git(root, &["config", "user.email", "tests@example.com"]);
    git(root, &["config", "user.name", "Tests"]);
    git(root, &["config", "commit.gpgsign", "false"]);
    std::fs::create_dir_all(root.join("config")).unwrap();
    std::fs::write(root.join("config/app.yaml"), "mode: a\n").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "initial"]);
    dir
}

fn tm(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tm"))
        .current_dir(root)
        .env("TM_LARGE_OBJECTS_DISABLED", "1")
        .env("GIT_AUTHOR_NAME", "Tests")
        .env("GIT_AUTHOR_EMAIL", "tests@example.com")
        .env("GIT_COMMITTER_NAME", "Tests")
        .env("GIT_COMMITTER_EMAIL", "tests@example.com")
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "CLI command should succeed. Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_cli_snapshot_list_diff_restore() {
    if !git_available() {
        return;
    }
    let dir = setup_repo();
    let root = dir.path();

    let first = json(&tm(
        root,
        &["--json", "snapshot", "--reason", "upgrade config", "--risk-level", "high"],
    ));
    let first_tag = first["tag"].as_str().unwrap().to_string();
    assert!(first_tag.starts_with("stable/"));
    assert_eq!(first["backend_status"], "both-committed");

    std::fs::write(root.join("config/app.yaml"), "mode: b\n").unwrap();
    let second = json(&tm(
        root,
        &["--json", "snapshot", "--reason", "flip", "--risk-level", "low"],
    ));
    let second_tag = second["tag"].as_str().unwrap().to_string();
    assert!(second_tag.starts_with("experiment/"));

    let listed = json(&tm(root, &["--json", "list"]));
    let tags: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec![second_tag.as_str(), first_tag.as_str()]);

    let filtered = json(&tm(root, &["--json", "list", "--filter", "stable"]));
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let diff = tm(root, &["diff", &first_tag, &second_tag]);
    assert!(diff.status.success());
    let summary = String::from_utf8_lossy(&diff.stdout);
    assert!(summary.contains("config/app.yaml"), "summary: {}", summary);

    let restored = json(&tm(root, &["--json", "restore", &first_tag, "--verify"]));
    assert_eq!(restored["state"], "committed");
    assert_eq!(restored["verification"]["overall"], "pass");
    assert_eq!(
        std::fs::read_to_string(root.join("config/app.yaml")).unwrap(),
        "mode: a\n"
    );
}

#[test]
fn test_cli_reports_error_codes() {
    if !git_available() {
        return;
    }
    let dir = setup_repo();

    let output = tm(dir.path(), &["restore", "stable/20240101-000000-abcd"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERR_UNKNOWN_VERSION"), "stderr: {}", stderr);

    let output = tm(
        dir.path(),
        &["snapshot", "--reason", "x", "--risk-level", "extreme"],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERR_INVALID_CATEGORY"), "stderr: {}", stderr);
}

#[test]
fn test_cli_refuses_snapshot_while_locked() {
    if !git_available() {
        return;
    }
    let dir = setup_repo();
    let _held = RepoLock::acquire(&dir.path().join(".timemachine/lock"), "restore").unwrap();

    let output = tm(dir.path(), &["snapshot", "--reason", "x"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERR_LOCKED"), "stderr: {}", stderr);

    let output = tm(dir.path(), &["list"]);
    assert!(output.status.success());
}
