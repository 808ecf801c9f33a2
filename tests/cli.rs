//! Exercises the `garden` binary itself: `validate` and `resolve` against a
//! small project on disk.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_project(dir: &std::path::Path) {
    let mut f = std::fs::File::create(dir.join("svc.garden.yml")).unwrap();
    writeln!(
        f,
        "kind: Build\nname: svc\ntype: container\n---\nkind: Deploy\nname: svc\ntype: container\ndependencies:\n  - kind: Build\n    name: svc\n"
    )
    .unwrap();
}

#[test]
fn validate_reports_the_actions_it_found() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    Command::cargo_bin("garden")
        .unwrap()
        .args(["--root", dir.path().to_str().unwrap(), "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 action(s)"));
}

#[test]
fn resolve_orders_build_before_deploy() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let output = Command::cargo_bin("garden")
        .unwrap()
        .args(["--root", dir.path().to_str().unwrap(), "resolve"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let build_pos = stdout.find("Build.svc").unwrap();
    let deploy_pos = stdout.find("Deploy.svc").unwrap();
    assert!(build_pos < deploy_pos);
}

#[test]
fn validate_fails_on_an_unknown_document_kind() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.garden.yml"), "kind: Buidl\nname: svc\ntype: container\n").unwrap();

    Command::cargo_bin("garden")
        .unwrap()
        .args(["--root", dir.path().to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean"));
}
