//! Integration tests for the HTTP transport and pagination probe against wiremock servers

use core::time::Duration;
use serde_json::json;
use snapshotter_lib::snapshot::{
    ApiRequest, EntityId, ErrorKind, FieldSet, HostLimits, HttpTransport, LinkHeader, PaginationProbe, ProbeCount, RateLimiter,
    ResourceFetcher, RetryPolicy, Transport,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        request_timeout: Duration::from_secs(5),
        max_retry_attempts: 3,
        retry_base_delay: Duration::from_millis(10),
        max_rate_limit_wait: Duration::from_secs(60),
    }
}

fn transport_for(server: &MockServer, policy: RetryPolicy) -> HttpTransport {
    let limiter = Arc::new(RateLimiter::new(HostLimits::default(), HashMap::new()));
    HttpTransport::new(&server.uri(), Some("test-token"), limiter, policy, Box::new(LinkHeader)).expect("transport should build")
}

#[tokio::test]
async fn test_get_sends_auth_and_accept_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "stargazers_count": 3 })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, fast_policy());
    let response = transport.get(&ApiRequest::new("/repos/a/b")).await.unwrap();

    assert_eq!(response.body["stargazers_count"], json!(3));
    assert_eq!(response.last_page, None);
}

#[tokio::test]
async fn test_not_found_is_unavailable_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport_for(&server, fast_policy())
        .get(&ApiRequest::new("/repos/a/b"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EntityUnavailable);
}

#[tokio::test]
async fn test_plain_forbidden_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport_for(&server, fast_policy())
        .get(&ApiRequest::new("/repos/private/repo"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EntityUnavailable);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport_for(&server, fast_policy())
        .get(&ApiRequest::new("/repos/a/b"))
        .await
        .unwrap();

    assert_eq!(response.body["ok"], json!(true));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    let err = transport_for(&server, fast_policy())
        .get(&ApiRequest::new("/repos/a/b"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientNetworkError);
}

#[tokio::test]
async fn test_too_many_requests_waits_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let start = Instant::now();
    let _ = transport_for(&server, fast_policy())
        .get(&ApiRequest::new("/repos/a/b"))
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(900), "retry should honour Retry-After");
}

#[tokio::test]
async fn test_rate_limit_beyond_allowed_wait_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3600"))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport_for(&server, fast_policy())
        .get(&ApiRequest::new("/repos/a/b"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = transport_for(&server, fast_policy())
        .get(&ApiRequest::new("/repos/a/b"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_probe_reads_last_page_from_link_header() {
    let server = MockServer::start().await;
    let link = format!(
        "<{0}/repos/a/b/commits?per_page=1&page=2>; rel=\"next\", <{0}/repos/a/b/commits?per_page=1&page=7>; rel=\"last\"",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/repos/a/b/commits"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "sha": "1" }])).insert_header("link", link.as_str()))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, fast_policy());
    let count = PaginationProbe::new(&transport).probe(&ApiRequest::new("/repos/a/b/commits")).await;

    assert_eq!(count, ProbeCount::Known(7));
}

#[tokio::test]
async fn test_probe_counts_items_without_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/contributors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/pulls"))
        .and(query_param("state", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "number": 1 }])))
        .mount(&server)
        .await;

    let transport = transport_for(&server, fast_policy());
    let probe = PaginationProbe::new(&transport);

    let none = probe.probe(&ApiRequest::new("/repos/a/b/contributors")).await;
    let one = probe.probe(&ApiRequest::new("/repos/a/b/pulls").with_param("state", "open")).await;

    assert_eq!(none, ProbeCount::Known(0));
    assert_eq!(one, ProbeCount::Known(1));
}

#[tokio::test]
async fn test_probe_ignores_malformed_link_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "id": 1 }]))
                .insert_header("link", "this is not a link header"),
        )
        .mount(&server)
        .await;

    let transport = transport_for(&server, fast_policy());
    let count = PaginationProbe::new(&transport).probe(&ApiRequest::new("/repos/a/b/issues")).await;

    assert_eq!(count, ProbeCount::Known(1));
}

#[tokio::test]
async fn test_probe_failure_is_unknown_not_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_retry_attempts: 0,
        ..fast_policy()
    };
    let transport = transport_for(&server, policy);
    let count = PaginationProbe::new(&transport).probe(&ApiRequest::new("/repos/a/b/commits")).await;

    assert_eq!(count, ProbeCount::Unknown);
    assert_eq!(count.as_i64(), -1);
    assert_ne!(count, ProbeCount::Known(0));
}

#[tokio::test]
async fn test_no_content_counts_as_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b/contributors"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, fast_policy());
    let response = transport.get(&ApiRequest::new("/repos/a/b/contributors")).await.unwrap();
    assert_eq!(response.body, json!([]));

    let count = PaginationProbe::new(&transport).probe(&ApiRequest::new("/repos/a/b/contributors")).await;
    assert_eq!(count, ProbeCount::Known(0));
}

#[tokio::test]
async fn test_rate_limit_pause_does_not_use_up_field_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/a/b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "stargazers_count": 5 })))
        .mount(&server)
        .await;

    let field_set = FieldSet::from_toml(
        r#"
        basic_endpoint = "/repos/{entity}"

        [[fields]]
        name = "stars"
        endpoint = "/repos/{entity}"
        extraction = "body-field"
        path = "stargazers_count"
        "#,
    )
    .unwrap();

    let fetcher = ResourceFetcher::new(transport_for(&server, fast_policy()), Duration::from_secs(1));
    let start = Instant::now();
    let snapshot = fetcher.fetch(&EntityId::parse("a/b").unwrap(), &field_set).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(1900), "fetch should wait out the rate limit");
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.value("stars"), Some(&json!(5)));
}
