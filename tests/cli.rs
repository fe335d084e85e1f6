// ABOUTME: End-to-end CLI tests using assert_cmd against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn relevo() -> Command {
    Command::cargo_bin("relevo").unwrap()
}

#[test]
fn help_lists_the_subcommands() {
    relevo()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("destroy"));
}

#[test]
fn init_writes_a_configuration_template() {
    let dir = tempfile::tempdir().unwrap();
    relevo()
        .current_dir(dir.path())
        .args(["init", "--name", "web", "--image", "nginx:1.25"])
        .assert()
        .success();

    let written = std::fs::read_to_string(dir.path().join("relevo.yml")).unwrap();
    assert!(written.contains("name: web"));
    assert!(written.contains("image: nginx:1.25"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().unwrap();
    relevo()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    relevo()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    relevo()
        .current_dir(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn init_rejects_an_invalid_name() {
    let dir = tempfile::tempdir().unwrap();
    relevo()
        .current_dir(dir.path())
        .args(["init", "--name", "Bad Name!"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn deploy_without_configuration_fails() {
    let dir = tempfile::tempdir().unwrap();
    relevo()
        .current_dir(dir.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn deploy_with_unknown_destination_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("relevo.yml"),
        "name: web\nimage: nginx:1.25\nhosts:\n  - h1.example.com\n",
    )
    .unwrap();

    relevo()
        .current_dir(dir.path())
        .args(["deploy", "--destination", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown destination"));
}

#[test]
fn exec_rejects_non_container_kinds() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("compose.yml"), "services: {}\n").unwrap();
    std::fs::write(
        dir.path().join("relevo.yml"),
        "name: web\nkind: stack\nconfig_file: compose.yml\nhosts:\n  - h1.example.com\n",
    )
    .unwrap();

    relevo()
        .current_dir(dir.path())
        .args(["exec", "--", "echo", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("container"));
}
