use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

/// `git-pw` with git configuration and `PW_*` variables isolated from the host.
fn git_pw(home: &TempDir) -> Command {
    let mut command = Command::cargo_bin("git-pw").expect("binary builds");
    command
        .current_dir(home.path())
        .env("HOME", home.path())
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env_remove("GIT_PAGER")
        .env_remove("RUST_LOG");
    for key in [
        "PW_DEBUG",
        "PW_TOKEN",
        "PW_USERNAME",
        "PW_PASSWORD",
        "PW_SERVER",
        "PW_PROJECT",
        "PW_TIMEOUT",
    ] {
        command.env_remove(key);
    }
    command
}

fn home() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

#[test]
fn help_lists_resources() {
    let home = home();
    git_pw(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("patch"))
        .stdout(predicate::str::contains("series"))
        .stdout(predicate::str::contains("bundle"));
}

#[test]
fn missing_server_exits_with_one() {
    let home = home();
    git_pw(&home)
        .args(["patch", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Server information missing"));
}

#[test]
fn missing_project_exits_with_one() {
    let home = home();
    git_pw(&home)
        .args(["--server", "http://127.0.0.1:9/api/1.1", "series", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Project information missing"));
}

#[test]
fn bundle_mutation_requires_recent_api() {
    let home = home();
    git_pw(&home)
        .args([
            "--server",
            "http://127.0.0.1:9/api/1.1",
            "--token",
            "abc",
            "bundle",
            "create",
            "backports",
            "1",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Creating bundles is only supported from API version 1.2",
        ));
}

#[test]
fn invalid_sort_is_a_usage_error() {
    let home = home();
    git_pw(&home)
        .args(["bundle", "list", "--sort", "date"])
        .assert()
        .code(2);
}

#[test]
fn unknown_state_is_rejected() {
    let home = home();
    git_pw(&home)
        .args([
            "--server",
            "http://127.0.0.1:9/api/1.1",
            "--token",
            "abc",
            "patch",
            "update",
            "1",
            "--state",
            "bogus",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn bundle_list_renders_rows() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/api/1.2/bundles/")
            .query_param("order", "name")
            .query_param("project", "demo");
        then.status(200).json_body(json!([{
            "id": 4,
            "name": "backports",
            "owner": {"username": "jane"},
            "public": true,
        }]));
    });
    let home = home();

    git_pw(&home)
        .args([
            "--server",
            &server.url("/api/1.2"),
            "--project",
            "demo",
            "bundle",
            "list",
            "--format",
            "csv",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ID\",\"Name\",\"Owner\",\"Public\""))
        .stdout(predicate::str::contains("\"4\",\"backports\",\"jane\",\"yes\""));
    list.assert();
}

#[test]
fn unversioned_server_warns() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/series/");
        then.status(200).json_body(json!([]));
    });
    let home = home();

    git_pw(&home)
        .args([
            "--server",
            &server.base_url(),
            "--project",
            "*",
            "series",
            "list",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Server version missing"));
}

#[test]
fn debug_can_be_enabled_from_the_environment() {
    let home = home();
    git_pw(&home)
        .env("PW_DEBUG", "true")
        .args(["patch", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dispatching"))
        .stderr(predicate::str::contains("Server information missing"));
}

#[test]
fn debug_is_quiet_by_default() {
    let home = home();
    git_pw(&home)
        .args(["patch", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dispatching").not());
}
