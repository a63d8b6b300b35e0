#![allow(clippy::unwrap_used)]
// Integration tests for `StoreClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pollcast_api::{CounterRow, Error, StoreClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const TABLE_PATH: &str = "/rest/v1/poll_options";

async fn setup() -> (MockServer, StoreClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = StoreClient::new(
        &base_url,
        "poll_options",
        &SecretString::from("service-key"),
        &TransportConfig::default(),
    )
    .unwrap();
    (server, client)
}

// ── Point reads ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_counter_sends_filter_and_credentials() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("select", "vote_count"))
        .and(query_param("id", "eq.opt-1"))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "vote_count": 12 }])))
        .expect(1)
        .mount(&server)
        .await;

    let count = client.get_counter("opt-1").await.unwrap();
    assert_eq!(count, Some(12));
}

#[tokio::test]
async fn test_get_counter_missing_row() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_eq!(client.get_counter("gone").await.unwrap(), None);
}

// ── Batched reads ───────────────────────────────────────────────────

#[tokio::test]
async fn test_get_counters_batches_ids() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("select", "id,vote_count"))
        .and(query_param("id", r#"in.("a","b","c")"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a", "vote_count": 1 },
            { "id": "c", "vote_count": null }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let rows = client.get_counters(&ids).await.unwrap();
    assert_eq!(
        rows,
        vec![
            CounterRow {
                id: "a".into(),
                vote_count: 1
            },
            CounterRow {
                id: "c".into(),
                vote_count: 0
            },
        ]
    );
}

#[tokio::test]
async fn test_get_counters_empty_skips_request() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    assert!(client.get_counters(&[]).await.unwrap().is_empty());
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("no"))
        .mount(&server)
        .await;

    let result = client.get_counter("x").await;
    assert!(
        matches!(result, Err(Error::Unauthorized { status: 401 })),
        "expected Unauthorized, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client
        .get_counters(&["a".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_bad_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = client.get_counter("x").await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}
