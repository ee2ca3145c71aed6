mod common;

use axum::http::{Method, StatusCode};
use common::{send, test_config, TestApp};
use dm_service::config::DmConfig;
use dm_service::models::IndexName;
use dm_service::services::providers::mock::MockLlmProvider;
use dm_service::services::vector_store::pinecone::PineconeStore;
use dm_service::startup::build_router;
use std::sync::Arc;

#[tokio::test]
async fn reset_clears_campaign_history() {
    let app = TestApp::new();
    app.seed(IndexName::Rules, &["Short rest: one hour."]).await;
    app.post_chat(r#"{"prompt": "We camp", "action": "talk"}"#).await;
    assert_eq!(app.store.len(IndexName::CampaignHistory).await, 1);

    let response = app.delete_chat().await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json()["message"],
        "Campaign history reset successfully"
    );
    assert_eq!(app.store.len(IndexName::CampaignHistory).await, 0);
    assert_eq!(app.store.len(IndexName::Rules).await, 1);
    assert!(app.state.dungeon_master.session_log().is_empty().await);
}

#[tokio::test]
async fn reset_without_pinecone_api_key_returns_500() {
    let store = Arc::new(
        PineconeStore::new(&DmConfig::default().vector_store).expect("Failed to build store"),
    );
    let state = TestApp::with_backends(test_config(), Arc::new(MockLlmProvider::new(true)), store);

    let response = send(build_router(state), Method::DELETE, "/chat", None).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = response.json()["error"].as_str().unwrap().to_string();
    assert!(error.contains("PINECONE_API_KEY"), "{error}");
}

#[tokio::test]
async fn chat_without_pinecone_api_key_returns_500() {
    let store = Arc::new(
        PineconeStore::new(&DmConfig::default().vector_store).expect("Failed to build store"),
    );
    let state = TestApp::with_backends(test_config(), Arc::new(MockLlmProvider::new(true)), store);

    let response = send(
        build_router(state),
        Method::POST,
        "/chat",
        Some(r#"{"prompt": "I attack", "action": "attack"}"#),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}
