//! Integration tests for the `vw` binary.
//!
//! Each test runs the real binary against an isolated home directory, a
//! config file pointing the resource store into a temp dir, and a
//! `[defaults] location`.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

/// Test fixture: an isolated home, config and working directory.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let store = dir.child("state").child("resources.json");
        dir.child("config.toml")
            .write_str(&format!(
                "[defaults]\nlocation = \"westus\"\n\n[store]\npath = \"{}\"\n",
                store.path().display().to_string().replace('\\', "\\\\")
            ))
            .expect("write config");
        dir.child("work").create_dir_all().expect("create work dir");
        Self { dir }
    }

    /// A `vw` command isolated from the user's environment.
    fn vw(&self) -> Command {
        let mut cmd = Command::cargo_bin("vw").expect("binary built");
        cmd.env("HOME", self.dir.path())
            .env("VW_CONFIG", self.dir.child("config.toml").path())
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("VW_LOG")
            .arg("--cwd")
            .arg(self.dir.child("work").path())
            .arg("--no-interactive");
        cmd
    }

    fn run(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.vw().args(args).assert()
    }
}

#[test]
fn create_then_show() {
    let ws = Workspace::new();
    ws.run(&["vm", "create", "-n", "vm1"])
        .success()
        .stdout(predicate::str::contains("\"name\": \"vm1\""))
        .stdout(predicate::str::contains("\"location\": \"westus\""));

    ws.run(&["vm", "show", "--name", "vm1"])
        .success()
        .stdout(predicate::str::contains("\"powerState\": \"stopped\""));
}

#[test]
fn missing_resource_exits_3() {
    let ws = Workspace::new();
    ws.run(&["vm", "show", "-n", "ghost"])
        .code(3)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn group_path_exits_2_and_lists_children() {
    let ws = Workspace::new();
    ws.run(&["vm"])
        .code(2)
        .stderr(predicate::str::contains("command group"))
        .stderr(predicate::str::contains("create"));
}

#[test]
fn unknown_argument_exits_2() {
    let ws = Workspace::new();
    ws.run(&["vm", "list", "--bogus"])
        .code(2)
        .stderr(predicate::str::contains("unrecognized argument: --bogus"));
}

#[test]
fn help_for_groups_and_commands() {
    let ws = Workspace::new();
    ws.run(&["vm", "--help"])
        .success()
        .stdout(predicate::str::contains("Usage: vw vm <command>"))
        .stdout(predicate::str::contains("Create a virtual machine."));

    ws.run(&["vm", "update", "-h"])
        .success()
        .stdout(predicate::str::contains("--name, -n STRING"))
        .stdout(predicate::str::contains("Generic Update:"));

    ws.run(&[])
        .success()
        .stdout(predicate::str::contains("Usage: vw <command>"));
}

#[test]
fn update_with_property_expressions() {
    let ws = Workspace::new();
    ws.run(&["vm", "create", "-n", "vm1"]).success();

    ws.run(&[
        "vm",
        "update",
        "-n",
        "vm1",
        "--set",
        "tags.env=prod",
        "--remove",
        "networkProfile.networkInterfaces",
        "0",
    ])
    .success()
    .stdout(predicate::str::contains("\"env\": \"prod\""))
    .stdout(predicate::str::contains("\"networkInterfaces\": []"));

    ws.run(&[
        "vm",
        "update",
        "-n",
        "vm1",
        "--remove",
        "networkProfile.networkInterfaces",
        "5",
    ])
    .code(4);
}

#[test]
fn start_prints_one_result_per_name() {
    let ws = Workspace::new();
    ws.run(&["vm", "create", "-n", "a"]).success();
    ws.run(&["vm", "create", "-n", "b"]).success();

    let output = ws.vw().args(["vm", "start", "--names", "a", "b"]).output().unwrap();
    assert!(output.status.success());
    let started: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(started.as_array().map(Vec::len), Some(2));
}

#[test]
fn file_arguments_resolve_against_cwd() {
    let ws = Workspace::new();
    ws.dir
        .child("work")
        .child("tags.txt")
        .write_str("team=infra")
        .unwrap();

    ws.run(&["vm", "create", "-n", "vm1", "--tags", "@tags.txt"])
        .success()
        .stdout(predicate::str::contains("\"team\": \"infra\""));
}

#[test]
fn local_defaults_override_global() {
    let ws = Workspace::new();
    ws.run(&["configure", "--scope", "local", "--defaults", "location=eastus"])
        .success();
    ws.dir
        .child("work")
        .child(".verbwork/config.toml")
        .assert(predicate::path::exists());

    ws.run(&["vm", "create", "-n", "vm1"])
        .success()
        .stdout(predicate::str::contains("\"location\": \"eastus\""));
}

#[test]
fn blank_secret_without_terminal_fails() {
    let ws = Workspace::new();
    ws.run(&["vm", "create", "-n", "vm1", "--admin-password", ""])
        .code(2)
        .stderr(predicate::str::contains("--admin-password cannot be blank"));
}

#[test]
fn missing_config_file_is_a_startup_error() {
    let ws = Workspace::new();
    Command::cargo_bin("vw")
        .unwrap()
        .env("HOME", ws.dir.path())
        .args(["--config", "/definitely/not/here.toml", "vm", "list"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[test]
fn config_env_naming_a_missing_file_is_a_startup_error() {
    let ws = Workspace::new();
    ws.vw()
        .env("VW_CONFIG", ws.dir.child("gone.toml").path())
        .args(["vm", "list"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn quiet_suppresses_results() {
    let ws = Workspace::new();
    ws.vw()
        .args(["-q", "vm", "list"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn completion_scripts_and_words() {
    let ws = Workspace::new();
    ws.run(&["completion", "bash"])
        .success()
        .stdout(predicate::str::contains("vw"));

    ws.run(&["vm", "create", "-n", "web1"]).success();
    ws.run(&["completion", "--words", "vm", "show", "--name", "w"])
        .success()
        .stdout(predicate::str::diff("web1\n"));

    ws.run(&["completion", "tcsh"]).code(2);
}
