//! Integration tests for event delivery over HTTP.

mod common;

use common::page_env;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use upassist_rum::{ConfigPatch, Dimensions, Error, Event, HttpTransport, Rum, Transport};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<Request> {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} request(s)", count);
}

#[tokio::test]
async fn test_transport_posts_event_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/rum/v1/events"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "event_name": "Signup",
            "plan": "pro",
            "seats": 3
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
    let event = Event::new()
        .with("event_name", "Signup")
        .with("plan", "pro")
        .with("seats", 3_i64);

    transport.send("Signup", &event).await.unwrap();
}

#[tokio::test]
async fn test_transport_reports_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let transport = HttpTransport::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
    let result = transport.send("Signup", &Event::new()).await;

    match result {
        Err(Error::Rejected(message)) => assert!(message.contains("500")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_delivers_initial_pageview() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/rum/v1/events"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let rum = Rum::builder()
        .api_host(mock_server.uri())
        .environment(Arc::new(page_env("https://shop.example.com/cart")))
        .build()
        .unwrap();

    rum.config(ConfigPatch::new().client_key("pk_test").environment("production"));

    let requests = wait_for_requests(&mock_server, 1).await;
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["event_name"], "Pageview");
    assert_eq!(body["client_key"], "pk_test");
    assert_eq!(body["environment"], "production");
    assert_eq!(body["url"], "https://shop.example.com/cart");
    assert_eq!(body["page_load_total"], 810);
    assert!(body["session_id"].is_string());
}

#[tokio::test]
async fn test_failed_delivery_does_not_stop_the_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let rum = Rum::builder()
        .api_host(mock_server.uri())
        .environment(Arc::new(page_env("https://shop.example.com/")))
        .build()
        .unwrap();
    rum.load("pk_test", ConfigPatch::new());

    rum.track("A", Dimensions::new());
    rum.track("B", Dimensions::new());

    let requests = wait_for_requests(&mock_server, 2).await;
    assert_eq!(requests.len(), 2);
}
