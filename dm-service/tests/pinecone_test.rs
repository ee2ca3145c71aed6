use dm_service::config::{DmConfig, VectorStoreConfig};
use dm_service::models::IndexName;
use dm_service::services::vector_store::pinecone::PineconeStore;
use dm_service::services::{VectorRecord, VectorStore, VectorStoreError};
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "pc-test-key";

fn store_config(server: &MockServer) -> VectorStoreConfig {
    let mut config = DmConfig::default().vector_store;
    config.api_key = Some(Secret::new(API_KEY.to_string()));
    config.control_plane_url = server.uri();
    config
}

/// The control plane answers once; the data plane lives on the same server.
async fn mount_index_host(server: &MockServer, index: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/indexes/{}", index)))
        .and(header("Api-Key", API_KEY))
        .and(header("X-Pinecone-API-Version", "2024-07"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": index, "host": server.uri() })),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn query_resolves_index_host_once_and_reads_metadata() {
    let server = MockServer::start().await;
    mount_index_host(&server, "rules").await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(header("Api-Key", API_KEY))
        .and(body_json(json!({
            "vector": [0.5, 0.25],
            "topK": 2,
            "includeMetadata": true,
            "includeValues": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                {
                    "id": "r-1",
                    "score": 0.91,
                    "metadata": { "text": "Grappling uses Athletics.", "source_file": "phb.md" }
                },
                { "id": "r-2", "score": 0.42, "metadata": { "text": "Prone creatures crawl." } }
            ],
            "namespace": ""
        })))
        .expect(2)
        .mount(&server)
        .await;

    let store = PineconeStore::new(&store_config(&server)).unwrap();

    let passages = store.query(IndexName::Rules, &[0.5, 0.25], 2).await.unwrap();
    assert_eq!(passages.len(), 2);
    assert_eq!(passages[0].id, "r-1");
    assert_eq!(passages[0].text, "Grappling uses Athletics.");
    assert_eq!(passages[0].source.as_deref(), Some("phb.md"));
    assert_eq!(passages[0].index, IndexName::Rules);
    assert_eq!(passages[1].source, None);

    // Second query reuses the cached host.
    let again = store.query(IndexName::Rules, &[0.5, 0.25], 2).await.unwrap();
    assert_eq!(again.len(), 2);
}

#[tokio::test]
async fn clear_treats_missing_namespace_as_success() {
    let server = MockServer::start().await;
    mount_index_host(&server, "campaign-history").await;

    Mock::given(method("POST"))
        .and(path("/vectors/delete"))
        .and(body_json(json!({ "deleteAll": true })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": 5,
            "message": "Namespace not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = PineconeStore::new(&store_config(&server)).unwrap();
    store.clear(IndexName::CampaignHistory).await.unwrap();
}

#[tokio::test]
async fn clear_reports_server_errors() {
    let server = MockServer::start().await;
    mount_index_host(&server, "campaign-history").await;

    Mock::given(method("POST"))
        .and(path("/vectors/delete"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": "INTERNAL", "message": "shard unavailable" }
        })))
        .mount(&server)
        .await;

    let store = PineconeStore::new(&store_config(&server)).unwrap();
    let err = store.clear(IndexName::CampaignHistory).await.unwrap_err();

    assert!(matches!(err, VectorStoreError::ApiError(_)));
    let message = err.to_string();
    assert!(message.contains("campaign-history"), "{message}");
    assert!(message.contains("shard unavailable"), "{message}");
}

#[tokio::test]
async fn upsert_sends_batches_of_one_hundred() {
    let server = MockServer::start().await;
    mount_index_host(&server, "monsters").await;

    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 75 })))
        .expect(2)
        .mount(&server)
        .await;

    let records: Vec<VectorRecord> = (0..150)
        .map(|i| VectorRecord::new(vec![i as f32, 1.0], format!("Goblin #{}", i)))
        .collect();

    let store = PineconeStore::new(&store_config(&server)).unwrap();
    let written = store.upsert(IndexName::Monsters, records).await.unwrap();
    assert_eq!(written, 150);
}

#[tokio::test]
async fn unknown_index_fails_host_lookup() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/indexes/campaign-modules"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "NOT_FOUND", "message": "Resource campaign-modules not found" }
        })))
        .mount(&server)
        .await;

    let store = PineconeStore::new(&store_config(&server)).unwrap();
    let err = store
        .query(IndexName::CampaignModules, &[0.1], 3)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Resource campaign-modules not found"));
}
