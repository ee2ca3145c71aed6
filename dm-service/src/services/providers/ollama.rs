//! Ollama chat provider (`/api/chat`, newline-delimited JSON streaming).

use super::{
    error_from_response, http_client, stream_lines, ChatMessage, GenerationParams, LineEvent,
    LlmProvider, ProviderError, ProviderStream,
};
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;

pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: http_client(600)?,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        // Ollama only takes temperature here; max_tokens is not forwarded.
        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream,
            options: OllamaOptions {
                temperature: params.temperature,
            },
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            stream,
            "Sending Ollama chat request"
        );

        let response = self
            .client
            .traced_post(&format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response("Ollama", response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let response = self.send(messages, params, false).await?;
        let chunk: OllamaChatChunk = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(ProviderError::ApiError(error));
        }
        Ok(chunk.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError> {
        let response = self.send(messages, params, true).await?;
        Ok(stream_lines(response, parse_ndjson_line))
    }
}

/// Interpret one line of an Ollama streaming response.
pub(crate) fn parse_ndjson_line(line: &str) -> LineEvent {
    if line.trim().is_empty() {
        return LineEvent::Skip;
    }

    match serde_json::from_str::<OllamaChatChunk>(line) {
        Ok(OllamaChatChunk {
            error: Some(error), ..
        }) => LineEvent::Failed(ProviderError::ApiError(error)),
        Ok(OllamaChatChunk {
            message: Some(message),
            ..
        }) if !message.content.is_empty() => LineEvent::Delta(message.content),
        Ok(OllamaChatChunk { done: true, .. }) => LineEvent::Done,
        Ok(_) => LineEvent::Skip,
        Err(e) => LineEvent::Failed(ProviderError::InvalidResponse(format!(
            "Malformed stream chunk: {}",
            e
        ))),
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}
