use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tsk"))
}

fn config_path(home: &Path) -> PathBuf {
    home.join(".tskrc")
}

fn run(home: &Path, args: &[&str]) -> Output {
    bin()
        .arg("--config")
        .arg(config_path(home))
        .args(args)
        .output()
        .expect("run tsk")
}

fn run_ok(home: &Path, args: &[&str]) -> String {
    let output = run(home, args);
    assert!(
        output.status.success(),
        "tsk {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8")
}

fn read_config(home: &Path) -> Value {
    let text = std::fs::read_to_string(config_path(home)).expect("read config");
    serde_json::from_str(&text).expect("parse config")
}

#[test]
fn version_prints_crate_version() {
    let output = bin().arg("version").output().expect("version");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.starts_with("tsk "));
}

#[test]
fn first_run_initialises_config_next_to_data_dir() {
    let home = TempDir::new().expect("home");
    let stdout = run_ok(home.path(), &["config", "file"]);
    let expected = home.path().join(".tskdata");
    assert!(stdout.contains(&expected.display().to_string()));

    let config = read_config(home.path());
    assert_eq!(config["system"]["mode"], "file");
    assert_eq!(config["categories"], serde_json::json!(["default"]));
}

#[test]
fn default_category_and_preferences() {
    let home = TempDir::new().expect("home");
    run_ok(home.path(), &["config", "default-category", "--edit", "work"]);
    run_ok(home.path(), &["config", "preference", "theme", "dark"]);

    let config = read_config(home.path());
    assert_eq!(config["categories"], serde_json::json!(["default", "work"]));
    assert_eq!(config["defaultCategory"], "work");
    assert_eq!(config["preferences"]["work"]["theme"], "dark");

    let stdout = run_ok(home.path(), &["config", "preference", "theme"]);
    assert!(stdout.contains("work.preferences.theme: \"dark\""));

    run_ok(home.path(), &["config", "preference", "--delete"]);
    let config = read_config(home.path());
    assert_eq!(config["preferences"], serde_json::json!({}));
}

#[test]
fn get_set_unset_dotted_paths() {
    let home = TempDir::new().expect("home");
    run_ok(home.path(), &["config", "set", "ui.list.limit", "25"]);
    let stdout = run_ok(home.path(), &["config", "get", "ui.list.limit"]);
    assert_eq!(stdout.trim(), "25");

    run_ok(home.path(), &["config", "unset", "ui.list.limit"]);
    let output = run(home.path(), &["config", "get", "ui.list.limit"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "{}", stderr);
}

#[test]
fn task_lifecycle_through_cli() {
    let home = TempDir::new().expect("home");
    let key = run_ok(
        home.path(),
        &["task", "add", "Write spec", "--tag", "docs", "--due", "2026-11-01"],
    );
    assert_eq!(key.trim(), "T-1");

    run_ok(home.path(), &["task", "done", "T-1"]);
    let listed = run_ok(home.path(), &["task", "list", "--json"]);
    let tasks: Value = serde_json::from_str(&listed).expect("json");
    let tasks = tasks.as_array().expect("array");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["key"], "T-1");
    assert_eq!(tasks[0]["status"], true);
    assert_eq!(tasks[0]["tags"], serde_json::json!(["docs"]));
    assert!(tasks[0]["_id"].as_str().is_some());

    let human = run_ok(home.path(), &["task", "list"]);
    assert!(human.contains("[x] T-1 | default | done | 2026-11-01 | Write spec"));

    run_ok(home.path(), &["task", "delete", "T-1"]);
    let output = run(home.path(), &["task", "show", "T-1"]);
    assert!(!output.status.success());
}

#[test]
fn enum_category_tasks() {
    let home = TempDir::new().expect("home");
    run_ok(home.path(), &["category", "add", "work"]);
    run_ok(home.path(), &["category", "mode", "work", "--set", "enum"]);
    run_ok(home.path(), &["category", "states", "work", "--set", "open,review,closed"]);
    run_ok(home.path(), &["task", "add", "Review PR", "-c", "work", "--key", "W-1"]);

    let shown = run_ok(home.path(), &["task", "show", "W-1"]);
    let task: Value = serde_json::from_str(&shown).expect("json");
    assert_eq!(task["status"], "open");

    run_ok(home.path(), &["task", "done", "W-1"]);
    let shown = run_ok(home.path(), &["task", "show", "W-1"]);
    let task: Value = serde_json::from_str(&shown).expect("json");
    assert_eq!(task["status"], "closed");

    let output = run(home.path(), &["category", "remove", "work"]);
    assert!(!output.status.success());
}
