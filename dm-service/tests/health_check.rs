mod common;

use axum::{body::Body, http::Request};
use common::{test_config, TestApp};
use dm_service::startup::Application;
use reqwest::Client;
use tower::util::ServiceExt;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::new();

    let response = app.get("/health").await;

    assert!(response.status.is_success());
    let body = response.json();
    assert_eq!(body["message"], "DMancipate is running!");
    assert_eq!(body["service"], "dm-service");
}

#[tokio::test]
async fn health_check_works_without_provider_credentials() {
    // Default LLM backend is OpenAI with no key; startup must still succeed.
    let mut config = test_config();
    config.llm = dm_service::config::DmConfig::default().llm;

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let port = app.port();
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let client = Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    let mut response = None;
    for _ in 0..50 {
        if let Ok(r) = client.get(&url).send().await {
            response = Some(r);
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    let response = response.expect("Server never became ready");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["message"], "DMancipate is running!");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "turn-42")
        .body(Body::empty())
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "turn-42");
}

#[tokio::test]
async fn metrics_endpoint_returns_prometheus_format() {
    let app = TestApp::new();
    app.post_chat(r#"{"prompt": "hello", "action": "talk"}"#).await;

    let response = app.get("/metrics").await;

    assert!(response.status.is_success());
    assert!(response
        .content_type
        .as_deref()
        .unwrap_or_default()
        .starts_with("text/plain"));
    assert!(response.body.contains("dm_chat_requests_total"));
}
