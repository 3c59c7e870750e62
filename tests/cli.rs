use assert_cmd::Command;
use httpmock::{Method::GET, MockServer};
use predicates::prelude::*;

fn cmd(server: &MockServer) -> Command {
    let mut cmd = Command::cargo_bin("yalidine").unwrap();
    cmd.env("YALIDINE_API_ID", "api-id")
        .env("YALIDINE_API_TOKEN", "api-token")
        .env("YALIDINE_API_URL", format!("{}/v1/", server.base_url()))
        .env("YALIDINE_RETRIES", "0")
        .env_remove("YALIDINE_AGENT")
        .arg("--log-level")
        .arg("warn");
    cmd
}

#[test]
fn ping_reports_ok() {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET).path("/v1/wilayas/").header("x-api-id", "api-id");
        then.status(200).json_body(serde_json::json!({"data": []}));
    });
    cmd(&server).arg("ping").assert().success().stdout("ok\n");
    m.assert_hits(1);
}

#[test]
fn ping_fails_when_unauthorized() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/wilayas/");
        then.status(401).json_body(serde_json::json!({"error": {"message": "nope"}}));
    });
    cmd(&server)
        .arg("ping")
        .assert()
        .failure()
        .stdout("unreachable\n");
}

#[test]
fn get_prints_payload_with_query() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/communes/")
            .query_param("wilaya_id", "16");
        then.status(200)
            .json_body(serde_json::json!({"data": [{"name": "Bab Ezzouar"}]}));
    });
    cmd(&server)
        .args(["get", "communes/", "--query", "wilaya_id=16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bab Ezzouar"));
}

#[test]
fn quota_prints_snapshot() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/wilayas/");
        then.status(200)
            .header("second-quota-left", "3")
            .json_body(serde_json::json!({"data": []}));
    });
    cmd(&server)
        .arg("quota")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"per_second\": 3"));
}

#[test]
fn init_prints_cached_count() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/wilayas/");
        then.status(200)
            .json_body(serde_json::json!({"data": [{"id": 1}, {"id": 2}]}));
    });
    cmd(&server)
        .arg("init")
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn missing_credentials_fail_fast() {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET);
        then.status(200);
    });
    cmd(&server)
        .env_remove("YALIDINE_API_TOKEN")
        .arg("ping")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing API token"));
    m.assert_hits(0);
}
