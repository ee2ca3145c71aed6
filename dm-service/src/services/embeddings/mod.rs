//! Text embedding backends used for retrieval and ingestion.

pub mod hash;
pub mod ollama;
pub mod openai;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider not configured: {0}")]
    NotConfigured(String),

    #[error("Embedding API error: {0}")]
    ApiError(String),

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Embed a batch of texts; the result has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding returned".to_string()))
    }
}

pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProviderKind::Ollama => Arc::new(ollama::OllamaEmbedder::new(config)?),
        EmbeddingProviderKind::OpenAi => Arc::new(openai::OpenAiEmbedder::new(config)?),
        EmbeddingProviderKind::Hash => Arc::new(hash::HashEmbedder::new(config.dimensions)),
    };
    Ok(embedder)
}

pub(crate) fn http_client() -> Result<reqwest::Client, EmbeddingError> {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| EmbeddingError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

/// Check that a backend returned one vector per input.
pub(crate) fn expect_count(
    vectors: Vec<Vec<f32>>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() == expected {
        Ok(vectors)
    } else {
        Err(EmbeddingError::InvalidResponse(format!(
            "Expected {} embeddings, got {}",
            expected,
            vectors.len()
        )))
    }
}
