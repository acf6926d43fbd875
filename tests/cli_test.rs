#![allow(deprecated)]

/// End-to-end tests of the `botdesk` binary
///
/// Most cases need no server: argument parsing, configuration validation
/// and the offline parts of `whoami`. Login runs against a wiremock server.
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
mod common;

fn botdesk() -> Command {
    let mut cmd = Command::cargo_bin("botdesk").unwrap();
    for var in [
        "BOTDESK_API_BASE",
        "BOTDESK_TIMEOUT_SECONDS",
        "BOTDESK_PROJECT_ID",
        "BOTDESK_API_KEY",
        "BOTDESK_STORE",
        "BOTDESK_PASSWORD",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_commands() {
    botdesk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("documents"));
}

#[test]
fn test_missing_command_fails() {
    botdesk().assert().failure();
}

#[test]
fn test_whoami_with_memory_store_and_configured_project() {
    let (_temp_dir, config_path) = common::temp_config_file(
        "api:\n  base_url: http://127.0.0.1:9/api/v1\nproject:\n  project_id: p-9\n  api_key: bk_cfg\nstorage:\n  backend: memory\n",
    );

    botdesk()
        .arg("--config")
        .arg(config_path)
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("not signed in"))
        .stdout(predicate::str::contains("p-9"))
        .stdout(predicate::str::contains("API key: set"));
}

#[test]
fn test_invalid_temperature_is_rejected() {
    let (_temp_dir, config_path) = common::temp_config_file(
        "chat:\n  temperature: 5.0\nstorage:\n  backend: memory\n",
    );

    botdesk()
        .arg("--config")
        .arg(config_path)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("chat.temperature"));
}

#[test]
fn test_unknown_storage_backend_is_rejected() {
    let (_temp_dir, config_path) =
        common::temp_config_file("storage:\n  backend: floppy\n");

    botdesk()
        .arg("--config")
        .arg(config_path)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid storage backend"));
}

#[test]
fn test_api_base_flag_overrides_config() {
    let (_temp_dir, config_path) = common::temp_config_file("storage:\n  backend: memory\n");

    botdesk()
        .arg("--config")
        .arg(config_path)
        .arg("--api-base")
        .arg("ftp://example.com")
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("http or https"));
}

#[tokio::test]
async fn test_login_sends_password_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::api_path("/auth/login")))
        .and(body_json(json!({
            "email": "ada@example.com",
            "password": "  spaced pass  "
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "user": {"id": 1, "email": "ada@example.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (temp_dir, config_path) = common::temp_config_file(&format!(
        "api:\n  base_url: {}{}\nstorage:\n  backend: memory\n",
        server.uri(),
        common::API_PREFIX
    ));

    let assert = tokio::task::spawn_blocking(move || {
        let _keep = temp_dir;
        botdesk()
            .arg("--config")
            .arg(config_path)
            .arg("login")
            .arg("--email")
            .arg("ada@example.com")
            .env("BOTDESK_PASSWORD", "  spaced pass  ")
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("Signed in as ada@example.com"));
}
