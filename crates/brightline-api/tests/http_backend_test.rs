#![allow(clippy::unwrap_used)]
// Integration tests for `HttpBackend` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use brightline_api::{BrightnessBackend, Error, HttpBackend, SetBrightnessRequest, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpBackend) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let backend = HttpBackend::with_client(reqwest::Client::new(), base_url, None).unwrap();
    (server, backend)
}

fn request(id: &str, value: i32, sequence: u64) -> SetBrightnessRequest {
    SetBrightnessRequest {
        id: id.into(),
        value,
        sequence,
    }
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_brightness_posts_request() {
    let (server, backend) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/brightness"))
        .and(body_json(json!({ "id": "D1", "value": 50, "sequence": 3 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend.set_brightness(&request("D1", 50, 3)).await.unwrap();
}

#[tokio::test]
async fn test_set_brightness_negative_value() {
    let (server, backend) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/brightness"))
        .and(body_json(json!({ "id": "D2", "value": -80, "sequence": 1 })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    backend.set_brightness(&request("D2", -80, 1)).await.unwrap();
}

#[tokio::test]
async fn test_set_brightness_unknown_device() {
    let (server, backend) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/brightness"))
        .respond_with(ResponseTemplate::new(404).set_body_string("monitor D9 not found"))
        .mount(&server)
        .await;

    let result = backend.set_brightness(&request("D9", 10, 1)).await;

    assert!(
        matches!(result, Err(Error::UnknownDevice { ref id }) if id == "D9"),
        "expected UnknownDevice, got: {result:?}"
    );
}

#[tokio::test]
async fn test_set_brightness_rejected() {
    let (server, backend) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/brightness"))
        .respond_with(ResponseTemplate::new(500).set_body_string("ddc write failed"))
        .mount(&server)
        .await;

    let err = backend.set_brightness(&request("D1", 10, 1)).await.unwrap_err();

    match err {
        Error::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "ddc write failed");
        }
        other => panic!("expected Rejected, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_set_brightness_timeout() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        timeout: Duration::from_millis(100),
        ..TransportConfig::default()
    };
    let backend = HttpBackend::new(Url::parse(&server.uri()).unwrap(), None, &transport).unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/brightness"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = backend.set_brightness(&request("D1", 10, 1)).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "got: {err:?}");
    assert!(err.is_transient());
}

// ── Watch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_begin_watch_fails_without_event_socket() {
    let (server, _) = setup().await;
    let backend = HttpBackend::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Some(Url::parse("ws://127.0.0.1:9/v1/events").unwrap()),
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/watch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = backend.begin_watch().await;
    assert!(
        matches!(result, Err(Error::WebSocketConnect(_))),
        "expected WebSocketConnect, got: {:?}",
        result.err()
    );
}

#[test]
fn test_events_url_derived_from_base() {
    let backend = HttpBackend::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:7878").unwrap(),
        None,
    )
    .unwrap();
    assert_eq!(backend.events_url().as_str(), "ws://127.0.0.1:7878/v1/events");
}
