#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! migration

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn imageflow() -> Command {
    let mut cmd = Command::cargo_bin("imageflow").unwrap();
    cmd.env_remove("IMAGEFLOW_CREDENTIALS")
        .env_remove("IMAGEFLOW_GITHUB_API_TOKEN")
        .env_remove("IMAGEFLOW_TAGS");
    cmd
}

/// Help lists the step's flags
#[test]
fn test_cli_help() {
    imageflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--action"))
        .stdout(predicate::str::contains("--repositories"))
        .stdout(predicate::str::contains("--minimum-severity-to-fail"))
        .stdout(predicate::str::contains("--cache-strategy"));
}

#[test]
fn test_cli_version() {
    imageflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("imageflow"));
}

#[test]
fn test_unknown_action_is_rejected() {
    imageflow()
        .args(["--action", "deploy", "--container", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("deploy"));
}

#[test]
fn test_push_without_any_tag_is_a_config_error() {
    imageflow()
        .args([
            "--action",
            "push",
            "--container",
            "app",
            "--repositories",
            "estafette",
            "--push-version-tag",
            "false",
            "--build-version",
            "1.0.0",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_invalid_credentials_are_a_config_error() {
    imageflow()
        .args([
            "--action",
            "push",
            "--container",
            "app",
            "--repositories",
            "estafette",
            "--build-version",
            "1.0.0",
            "--credentials",
            "not json",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_build_without_dockerfile_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_str().unwrap();
    let template = dir.path().join("template").join("Dockerfile");

    imageflow()
        .current_dir(dir.path())
        .args([
            "--action",
            "build",
            "--container",
            "app",
            "--repositories",
            "estafette",
            "--build-version",
            "1.0.0",
            "--path",
            path,
            "--dockerfile",
            "Dockerfile",
        ])
        .arg("--template-dockerfile")
        .arg(&template)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Dockerfile"));
}

/// Every flag falls back to its IMAGEFLOW_* variable
#[test]
fn test_environment_fallback() {
    imageflow()
        .env("IMAGEFLOW_ACTION", "push")
        .env("IMAGEFLOW_CONTAINER", "app")
        .env("IMAGEFLOW_REPOSITORIES", "estafette")
        .env("IMAGEFLOW_PUSH_VERSION_TAG", "false")
        .env("IMAGEFLOW_BUILD_VERSION", "1.0.0")
        .assert()
        .code(2);
}
