//! End-to-end tests of the `serverdb` binary against scratch SQLite files.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct Scratch {
    dir: TempDir,
}

impl Scratch {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("servers.sqlite")
    }

    /// Runs `serverdb --sqlite <scratch db> <args>`.
    fn run(&self, args: &[&str]) -> Output {
        let db = self.db();
        let mut full = vec!["--sqlite", db.to_str().unwrap()];
        full.extend_from_slice(args);
        serverdb(&full)
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "serverdb {args:?} failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }

    fn fails(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert_eq!(output.status.code(), Some(1), "serverdb {args:?} should fail");
        String::from_utf8(output.stderr).unwrap()
    }
}

fn serverdb(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_serverdb"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run serverdb")
}

fn write_parameter_file(dir: &Path, db: &Path) -> PathBuf {
    let file = dir.join("serverdb.yaml");
    std::fs::write(&file, format!("backend: sqlite\npath: {}\n", db.display())).unwrap();
    file
}

#[test]
fn init_creates_database_with_default_server() {
    let scratch = Scratch::new();
    let out = scratch.ok(&["init"]);
    assert!(out.contains("SQLite database ready"));
    assert!(out.contains("1 server(s) registered"));
    assert!(scratch.db().exists());

    assert_eq!(scratch.ok(&["server", "list"]), "1\n");
}

#[test]
fn server_commands_round_trip() {
    let scratch = Scratch::new();
    scratch.ok(&["server", "add", "2"]);
    scratch.ok(&["server", "add", "5"]);
    assert_eq!(scratch.ok(&["server", "list"]), "1\n2\n5\n");
    assert_eq!(scratch.ok(&["server", "exists", "2"]), "true\n");
    assert_eq!(scratch.ok(&["server", "next-free"]), "3\n");

    scratch.ok(&["server", "remove", "2"]);
    assert_eq!(scratch.ok(&["server", "exists", "2"]), "false\n");
}

#[test]
fn duplicate_server_prints_cause_chain() {
    let scratch = Scratch::new();
    let stderr = scratch.fails(&["server", "add", "1"]);
    let lines: Vec<&str> = stderr.lines().collect();
    assert_eq!(lines[0], "error:");
    assert_eq!(lines[1], "  server 1 already exists");
    assert!(lines.len() >= 3);
    assert!(lines[1..].iter().all(|line| line.starts_with("  ")));
}

#[test]
fn log_write_and_show() {
    let scratch = Scratch::new();
    scratch.ok(&["log", "write", "1", "hello"]);
    scratch.ok(&["log", "write", "1", "✅ 👀"]);

    let text = scratch.ok(&["log", "show", "1"]);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("  hello"));
    assert!(lines[1].ends_with("  ✅ 👀"));

    let json: serde_json::Value =
        serde_json::from_str(&scratch.ok(&["log", "show", "1", "--json", "--offset", "1"]))
            .unwrap();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message"], "✅ 👀");
    assert_eq!(entries[0]["server_id"], 1);

    let limited = scratch.ok(&["log", "show", "1", "--limit", "1"]);
    assert_eq!(limited.lines().count(), 1);
}

#[test]
fn log_to_unknown_server_fails() {
    let scratch = Scratch::new();
    let stderr = scratch.fails(&["log", "write", "5", "x"]);
    assert!(stderr.starts_with("error:\n"));
    assert!(stderr.contains("server 5 does not exist"));
    assert_eq!(scratch.ok(&["log", "show", "5"]), "");
}

#[test]
fn config_commands_round_trip() {
    let scratch = Scratch::new();
    scratch.ok(&["config", "set", "1", "miau", "test"]);
    scratch.ok(&["config", "set", "1", "miau", "different"]);
    scratch.ok(&["config", "set", "1", "theKey", "theValue"]);
    assert_eq!(scratch.ok(&["config", "get", "1", "miau"]), "different\n");

    scratch.ok(&["config", "clear", "1", "theKey"]);
    assert_eq!(
        scratch.ok(&["config", "get", "1", "theKey", "--default", "theDefault"]),
        "theDefault\n"
    );
    assert_eq!(scratch.ok(&["config", "list", "1"]), "miau = different\n");

    let json: serde_json::Value =
        serde_json::from_str(&scratch.ok(&["config", "list", "1", "--json"])).unwrap();
    assert_eq!(json, serde_json::json!({ "miau": "different" }));

    scratch.ok(&["config", "clear-all", "1"]);
    assert_eq!(scratch.ok(&["config", "list", "1"]), "");
}

#[test]
fn config_set_for_unknown_server_fails() {
    let scratch = Scratch::new();
    let stderr = scratch.fails(&["config", "set", "9", "k", "v"]);
    assert!(stderr.contains("server 9 does not exist"));
}

#[test]
fn parameter_file_and_prefix() {
    let scratch = Scratch::new();
    let file = write_parameter_file(scratch.dir.path(), &scratch.db());
    let file = file.to_str().unwrap();

    let out = serverdb(&["--config", file, "--prefix", "vs_", "init"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("vs_servers"));

    let out = serverdb(&["--config", file, "--prefix", "vs_", "server", "add", "3"]);
    assert!(out.status.success());

    // Unprefixed tables are a separate installation.
    assert_eq!(scratch.ok(&["server", "list"]), "1\n");
}

#[test]
fn invalid_prefix_is_rejected() {
    let scratch = Scratch::new();
    let stderr = scratch.fails(&["--prefix", "bad-prefix", "init"]);
    assert!(stderr.contains("invalid table prefix"));
}

#[test]
fn missing_parameter_file_is_reported() {
    let scratch = Scratch::new();
    let missing = scratch.dir.path().join("missing.yaml");
    let out = serverdb(&["--config", missing.to_str().unwrap(), "init"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("failed to read connection parameters"));
}

#[test]
fn missing_target_is_a_usage_error() {
    let out = serverdb(&["server", "list"]);
    assert_eq!(out.status.code(), Some(2));
}
