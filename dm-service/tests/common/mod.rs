#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use dm_service::config::{DmConfig, LlmProviderKind, VectorStoreBackend};
use dm_service::models::IndexName;
use dm_service::services::embeddings::hash::HashEmbedder;
use dm_service::services::metrics::init_metrics;
use dm_service::services::providers::mock::MockLlmProvider;
use dm_service::services::vector_store::memory::MemoryStore;
use dm_service::services::{DungeonMaster, Embedder, LlmProvider, VectorRecord, VectorStore};
use dm_service::startup::{build_router, AppState};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const EMBEDDING_DIMENSIONS: usize = 64;

/// Offline configuration: mock LLM, hashing embedder, in-memory store.
pub fn test_config() -> DmConfig {
    let mut config = DmConfig::default();
    config.common.port = 0;
    config.llm.provider = LlmProviderKind::Mock;
    config.vector_store.backend = VectorStoreBackend::Memory;
    config.embeddings.dimensions = EMBEDDING_DIMENSIONS;
    config
}

pub struct TestApp {
    pub state: AppState,
    pub llm: Arc<MockLlmProvider>,
    pub store: Arc<MemoryStore>,
    pub embedder: Arc<HashEmbedder>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_llm(MockLlmProvider::new(true))
    }

    pub fn with_llm(llm: MockLlmProvider) -> Self {
        init_metrics().expect("Failed to initialize metrics");

        let config = test_config();
        let llm = Arc::new(llm);
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(HashEmbedder::new(EMBEDDING_DIMENSIONS));
        let dungeon_master = DungeonMaster::new(llm.clone(), embedder.clone(), store.clone(), &config);

        Self {
            state: AppState {
                config,
                dungeon_master,
            },
            llm,
            store,
            embedder,
        }
    }

    /// App whose backends are built exactly as production would build them.
    pub fn with_backends(
        config: DmConfig,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
    ) -> AppState {
        init_metrics().expect("Failed to initialize metrics");
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(EMBEDDING_DIMENSIONS));
        let dungeon_master = DungeonMaster::new(llm, embedder, store, &config);
        AppState {
            config,
            dungeon_master,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn seed(&self, index: IndexName, texts: &[&str]) {
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = self.embedder.embed(&texts).await.expect("Failed to embed");
        let records = vectors
            .into_iter()
            .zip(&texts)
            .map(|(values, text)| VectorRecord::new(values, text.as_str()))
            .collect();
        self.store
            .upsert(index, records)
            .await
            .expect("Failed to seed index");
    }

    pub async fn post_chat(&self, body: &str) -> TestResponse {
        send(self.router(), Method::POST, "/chat", Some(body)).await
    }

    pub async fn delete_chat(&self) -> TestResponse {
        send(self.router(), Method::DELETE, "/chat", None).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        send(self.router(), Method::GET, uri, None).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Response body is not JSON")
    }
}

pub async fn send(router: Router, method: Method, uri: &str, body: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    TestResponse {
        status,
        content_type,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}
