//! End-to-end tests that drive the scheduler and the `run` command against wiremock servers

use core::time::Duration;
use serde_json::{Value, json};
use snapshotter_lib::snapshot::{
    EntityId, FieldSet, HostLimits, HttpTransport, LinkHeader, NoProgress, RateLimiter, ResourceFetcher, RetryPolicy, SnapshotScheduler,
    SnapshotStore,
};
use snapshotter_lib::{Host, run};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIELDS_TOML: &str = r#"
basic_endpoint = "/repos/{entity}"

[[fields]]
name = "stars"
endpoint = "/repos/{entity}"
extraction = "body-field"
path = "stargazers_count"

[[fields]]
name = "license"
endpoint = "/repos/{entity}"
extraction = "body-field"
path = "license"

[[fields]]
name = "commits"
endpoint = "/repos/{entity}/commits"
extraction = "pagination-count"
"#;

const CONFIG_TOML: &str = r#"
concurrency = 2
base_delay = "0s"
request_timeout = "5s"
field_timeout = "10s"
max_retry_attempts = 1
retry_base_delay = "10ms"
"#;

#[derive(Debug, Default)]
struct CaptureHost {
    output: Vec<u8>,
    error: Vec<u8>,
    exit_code: Option<i32>,
}

impl Host for CaptureHost {
    fn output(&mut self) -> impl Write {
        &mut self.output
    }

    fn error(&mut self) -> impl Write {
        &mut self.error
    }

    fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }
}

/// `a/b` does not exist; `c/d` has 12 stars, no license, and 40 commits.
async fn mock_api() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/c/d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "stargazers_count": 12, "license": null })))
        .expect(1)
        .mount(&server)
        .await;

    let link = format!("<{}/repos/c/d/commits?per_page=1&page=40>; rel=\"last\"", server.uri());
    Mock::given(method("GET"))
        .and(path("/repos/c/d/commits"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{}])).insert_header("link", link.as_str()))
        .mount(&server)
        .await;

    server
}

fn ids(list: &[&str]) -> Vec<EntityId> {
    list.iter().map(|s| EntityId::parse(s).unwrap()).collect()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_scheduler_isolates_unavailable_entity() {
    let server = mock_api().await;
    let limiter = Arc::new(RateLimiter::new(HostLimits::default(), HashMap::new()));
    let policy = RetryPolicy {
        request_timeout: Duration::from_secs(5),
        max_retry_attempts: 1,
        retry_base_delay: Duration::from_millis(10),
        max_rate_limit_wait: Duration::from_secs(10),
    };
    let transport = HttpTransport::new(&server.uri(), None, limiter, policy, Box::new(LinkHeader)).unwrap();
    let scheduler = SnapshotScheduler::new(
        ResourceFetcher::new(transport, Duration::from_secs(10)),
        Duration::ZERO,
        Arc::new(SnapshotStore::new()),
        Arc::new(NoProgress),
    );
    let field_set = FieldSet::from_toml(FIELDS_TOML).unwrap();

    let result = scheduler.run(&ids(&["a/b", "c/d", "a/b"]), &field_set, 2).await;

    assert_eq!(result.len(), 2);
    let keys: Vec<_> = result.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(keys, ["a/b", "c/d"]);

    let broken = serde_json::to_value(result.get(&ids(&["a/b"])[0]).unwrap()).unwrap();
    assert_eq!(broken["stars"], Value::Null);
    assert_eq!(broken["commits"], Value::Null);
    assert_eq!(broken["errors"]["basic"], json!("EntityUnavailable"));
    assert_eq!(broken["errors"]["stars"], json!("EntityUnavailable"));

    let good = serde_json::to_value(result.get(&ids(&["c/d"])[0]).unwrap()).unwrap();
    assert_eq!(good["stars"], json!(12));
    assert_eq!(good["license"], Value::Null);
    assert_eq!(good["commits"], json!(40));
    assert_eq!(good["errors"], json!({}));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
async fn test_run_command_writes_snapshot() {
    let server = mock_api().await;
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    fs::write(dir.join("fields.toml"), FIELDS_TOML).unwrap();
    fs::write(dir.join("snapshotter.toml"), CONFIG_TOML).unwrap();
    fs::write(dir.join("repos.txt"), "# test repositories\na/b\nc/d\n").unwrap();

    let out = dir.join("out").join("ui.json");
    let per_entity = dir.join("temp");
    let arg = |p: &Path| p.to_str().unwrap().to_string();

    let mut host = CaptureHost::default();
    run(
        &mut host,
        [
            "snapshotter".to_string(),
            "run".to_string(),
            "--entities".to_string(),
            arg(&dir.join("repos.txt")),
            "--fields".to_string(),
            arg(&dir.join("fields.toml")),
            "--config".to_string(),
            arg(&dir.join("snapshotter.toml")),
            "--out".to_string(),
            arg(&out),
            "--per-entity-dir".to_string(),
            arg(&per_entity),
            "--api-url".to_string(),
            server.uri(),
            "--token".to_string(),
            "test-token".to_string(),
            "--color".to_string(),
            "never".to_string(),
        ],
    )
    .await
    .unwrap();

    let snapshot = read_json(&out);
    let keys: Vec<_> = snapshot.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["a/b", "c/d"]);
    assert_eq!(snapshot["a/b"]["errors"]["basic"], json!("EntityUnavailable"));
    assert_eq!(snapshot["c/d"]["commits"], json!(40));

    let field_order: Vec<_> = snapshot["c/d"].as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(field_order, ["stamp", "stars", "license", "commits", "errors"]);

    assert_eq!(read_json(&per_entity.join("c-d.json"))["stars"], json!(12));
    assert!(per_entity.join("a-b.json").exists());

    let summary = String::from_utf8(host.output).unwrap();
    assert!(summary.contains("Captured 2 entities"), "unexpected summary: {summary}");
    assert!(String::from_utf8(host.error).unwrap().contains("'a/b'"));
    assert_eq!(host.exit_code, None);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
async fn test_run_command_appends_to_existing_output() {
    let server = mock_api().await;
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    fs::write(dir.join("fields.toml"), FIELDS_TOML).unwrap();
    fs::write(dir.join("snapshotter.toml"), CONFIG_TOML).unwrap();
    fs::write(dir.join("repos.json"), r#"["c/d"]"#).unwrap();

    let out = dir.join("ui.json");
    fs::write(&out, "{\n  \"old/repo\": {\"stamp\": \"2024-01-01T00:00:00Z\", \"errors\": {}}\n}\n").unwrap();
    let arg = |p: &Path| p.to_str().unwrap().to_string();

    let mut host = CaptureHost::default();
    run(
        &mut host,
        [
            "snapshotter".to_string(),
            "run".to_string(),
            "--entities".to_string(),
            arg(&dir.join("repos.json")),
            "--fields".to_string(),
            arg(&dir.join("fields.toml")),
            "--config".to_string(),
            arg(&dir.join("snapshotter.toml")),
            "--out".to_string(),
            arg(&out),
            "--append".to_string(),
            "--api-url".to_string(),
            server.uri(),
        ],
    )
    .await
    .unwrap();

    let snapshot = read_json(&out);
    let keys: Vec<_> = snapshot.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["old/repo", "c/d"]);
    assert_eq!(snapshot["c/d"]["stars"], json!(12));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
async fn test_run_command_refuses_corrupt_append_target() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    fs::write(dir.join("fields.toml"), FIELDS_TOML).unwrap();
    fs::write(dir.join("snapshotter.toml"), CONFIG_TOML).unwrap();
    fs::write(dir.join("repos.txt"), "c/d\n").unwrap();

    let out = dir.join("ui.json");
    fs::write(&out, "not json at all").unwrap();
    let arg = |p: &Path| p.to_str().unwrap().to_string();

    let mut host = CaptureHost::default();
    let err = run(
        &mut host,
        [
            "snapshotter".to_string(),
            "run".to_string(),
            "--entities".to_string(),
            arg(&dir.join("repos.txt")),
            "--fields".to_string(),
            arg(&dir.join("fields.toml")),
            "--config".to_string(),
            arg(&dir.join("snapshotter.toml")),
            "--out".to_string(),
            arg(&out),
            "--append".to_string(),
            "--api-url".to_string(),
            server.uri(),
        ],
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("cannot append"), "unexpected error: {err}");
    assert_eq!(fs::read_to_string(&out).unwrap(), "not json at all");
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "nothing should be fetched for an unusable append target"
    );
}
