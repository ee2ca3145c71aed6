//! Chat-completion provider abstractions and implementations.
//!
//! The DM talks to one backend chosen at startup: an OpenAI-compatible API,
//! a local Ollama server, or the mock used by tests.

pub mod mock;
pub mod ollama;
pub mod openai;

use crate::config::{LlmConfig, LlmProviderKind};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

/// Error type for provider operations.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Generation parameters for a completion request.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: Some(config.temperature),
            max_tokens: Some(config.max_tokens),
        }
    }
}

/// Stream of text deltas.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    /// Generate a complete reply.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, ProviderError>;

    /// Generate a reply as a stream of text deltas.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError>;
}

/// Build the provider selected by configuration.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    let provider: Arc<dyn LlmProvider> = match config.provider {
        LlmProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::new(config)?),
        LlmProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(config)?),
        LlmProviderKind::Mock => Arc::new(mock::MockLlmProvider::new(true)),
    };
    Ok(provider)
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-success HTTP response to a provider error, preferring the
/// backend's own `error.message` (or `error`) field when present.
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    if status.as_u16() == 429 {
        return ProviderError::RateLimited;
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error").and_then(|e| {
                e.get("message")
                    .and_then(|m| m.as_str())
                    .or_else(|| e.as_str())
                    .map(str::to_string)
            })
        })
        .unwrap_or(body);

    ProviderError::ApiError(format!("{} API error {}: {}", provider, status, message))
}

/// What a single line of a streamed response body means.
#[derive(Debug)]
pub(crate) enum LineEvent {
    Delta(String),
    Skip,
    Done,
    Failed(ProviderError),
}

/// Read a line-oriented streaming body (SSE or NDJSON) on a background task
/// and forward the deltas produced by `parse`.
pub(crate) fn stream_lines<F>(response: reqwest::Response, mut parse: F) -> ProviderStream
where
    F: FnMut(&str) -> LineEvent + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::NetworkError(e.to_string()))).await;
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if !forward(&tx, parse(line.trim_end_matches(['\r', '\n']))).await {
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).to_string();
            forward(&tx, parse(line.trim())).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Returns false once the stream should stop.
async fn forward(tx: &mpsc::Sender<Result<String, ProviderError>>, event: LineEvent) -> bool {
    match event {
        LineEvent::Delta(text) if text.is_empty() => true,
        LineEvent::Delta(text) => tx.send(Ok(text)).await.is_ok(),
        LineEvent::Skip => true,
        LineEvent::Done => false,
        LineEvent::Failed(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
