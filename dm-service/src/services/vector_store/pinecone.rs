//! Pinecone serverless backend over its REST data plane.
//!
//! Each [`IndexName`] maps to a Pinecone index of the same name. Index hosts
//! are looked up once through the control plane and cached.

use super::{Passage, VectorRecord, VectorStore, VectorStoreError};
use crate::config::VectorStoreConfig;
use crate::models::IndexName;
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use service_core::observability::{TracedClientExt, TracedRequest};
use std::collections::HashMap;
use tokio::sync::RwLock;

const API_VERSION: &str = "2024-07";
const UPSERT_BATCH: usize = 100;

pub struct PineconeStore {
    api_key: Option<Secret<String>>,
    control_plane_url: String,
    namespace: Option<String>,
    client: reqwest::Client,
    hosts: RwLock<HashMap<IndexName, String>>,
}

impl PineconeStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VectorStoreError::NotConfigured(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            client,
            hosts: RwLock::new(HashMap::new()),
        })
    }

    fn api_key(&self) -> Result<&str, VectorStoreError> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .ok_or_else(|| {
                VectorStoreError::NotConfigured("PINECONE_API_KEY is not set".to_string())
            })
    }

    fn authorize(&self, request: TracedRequest) -> Result<TracedRequest, VectorStoreError> {
        Ok(request
            .header("Api-Key", self.api_key()?)
            .header("X-Pinecone-API-Version", API_VERSION))
    }

    /// Data plane URL for an index, resolved through the control plane.
    async fn host(&self, index: IndexName) -> Result<String, VectorStoreError> {
        if let Some(host) = self.hosts.read().await.get(&index) {
            return Ok(host.clone());
        }

        let url = format!("{}/indexes/{}", self.control_plane_url, index.as_str());
        let response = self
            .authorize(self.client.traced_get(&url))?
            .send()
            .await
            .map_err(|e| VectorStoreError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(index, response).await);
        }

        let description: IndexDescription = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(format!("Failed to parse index description: {}", e)))?;
        let host = normalize_host(&description.host);

        tracing::debug!(index = %index, host = %host, "Resolved Pinecone index host");
        self.hosts.write().await.insert(index, host.clone());
        Ok(host)
    }

    async fn post<T: Serialize>(
        &self,
        index: IndexName,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, VectorStoreError> {
        let url = format!("{}{}", self.host(index).await?, path);
        self.authorize(self.client.traced_post(&url))?
            .json(body)
            .send()
            .await
            .map_err(|e| VectorStoreError::NetworkError(e.to_string()))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn error_from_response(index: IndexName, response: reqwest::Response) -> VectorStoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);

    VectorStoreError::ApiError(format!("Pinecone index '{}' returned {}: {}", index, status, message))
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &'static str {
        "pinecone"
    }

    async fn query(
        &self,
        index: IndexName,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Passage>, VectorStoreError> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };

        let response = self.post(index, "/query", &request).await?;
        if !response.status().is_success() {
            return Err(error_from_response(index, response).await);
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(format!("Failed to parse query response: {}", e)))?;

        Ok(result
            .matches
            .into_iter()
            .map(|m| Passage::from_metadata(index, m.id, m.score, &m.metadata))
            .collect())
    }

    async fn upsert(
        &self,
        index: IndexName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, VectorStoreError> {
        let mut written = 0;

        for batch in records.chunks(UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| PineconeVector {
                        id: &r.id,
                        values: &r.values,
                        metadata: &r.metadata,
                    })
                    .collect(),
                namespace: self.namespace.as_deref(),
            };

            let response = self.post(index, "/vectors/upsert", &request).await?;
            if !response.status().is_success() {
                return Err(error_from_response(index, response).await);
            }

            let result: UpsertResponse = response.json().await.map_err(|e| {
                VectorStoreError::InvalidResponse(format!("Failed to parse upsert response: {}", e))
            })?;
            written += result.upserted_count;
        }

        Ok(written)
    }

    async fn clear(&self, index: IndexName) -> Result<(), VectorStoreError> {
        let request = DeleteAllRequest {
            delete_all: true,
            namespace: self.namespace.as_deref(),
        };

        let response = self.post(index, "/vectors/delete", &request).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            // Namespace does not exist yet, so there is nothing to delete.
            StatusCode::NOT_FOUND => {
                tracing::debug!(index = %index, "Namespace not found on delete-all");
                Ok(())
            }
            _ => Err(error_from_response(index, response).await),
        }
    }
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAllRequest<'a> {
    delete_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}
