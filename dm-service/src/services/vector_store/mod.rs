//! Vector index backends holding rules, monsters, modules and campaign history.

pub mod memory;
pub mod pinecone;

use crate::config::{VectorStoreBackend, VectorStoreConfig};
use crate::models::IndexName;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Metadata key holding the passage text.
pub const TEXT_KEY: &str = "text";

/// Metadata key holding the file a passage was ingested from.
pub const SOURCE_KEY: &str = "source_file";

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Vector store not configured: {0}")]
    NotConfigured(String),

    #[error("Vector store API error: {0}")]
    ApiError(String),

    #[error("Invalid vector store response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// A document chunk with its embedding, ready to upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

impl VectorRecord {
    pub fn new(values: Vec<f32>, text: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(TEXT_KEY.to_string(), Value::String(text.into()));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            values,
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        self.metadata
            .get(TEXT_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// A retrieved chunk of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub index: IndexName,
    pub id: String,
    pub text: String,
    pub score: f32,
    pub source: Option<String>,
}

impl Passage {
    pub(crate) fn from_metadata(
        index: IndexName,
        id: String,
        score: f32,
        metadata: &Map<String, Value>,
    ) -> Self {
        Self {
            index,
            id,
            score,
            text: metadata
                .get(TEXT_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            source: metadata
                .get(SOURCE_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Nearest passages to `vector`, best first.
    async fn query(
        &self,
        index: IndexName,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Passage>, VectorStoreError>;

    /// Insert or replace records by id. Returns the number written.
    async fn upsert(
        &self,
        index: IndexName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, VectorStoreError>;

    /// Remove every record from the index.
    async fn clear(&self, index: IndexName) -> Result<(), VectorStoreError>;
}

pub fn build_vector_store(
    config: &VectorStoreConfig,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    let store: Arc<dyn VectorStore> = match config.backend {
        VectorStoreBackend::Pinecone => Arc::new(pinecone::PineconeStore::new(config)?),
        VectorStoreBackend::Memory => Arc::new(memory::MemoryStore::new()),
    };
    Ok(store)
}
