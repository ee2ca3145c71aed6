//! Mock provider implementation for testing and offline play.

use super::{ChatMessage, GenerationParams, LlmProvider, ProviderError, ProviderStream, Role};
use async_trait::async_trait;
use std::sync::Mutex;

/// Mock chat provider. Records every request so tests can inspect the
/// assembled prompts.
pub struct MockLlmProvider {
    enabled: bool,
    reply: Option<String>,
    stream_error: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlmProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            reply: None,
            stream_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `reply` instead of echoing the prompt.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Fail streams with `error` after the first chunk.
    pub fn with_stream_error(mut self, error: impl Into<String>) -> Self {
        self.stream_error = Some(error.into());
        self
    }

    /// Every message list sent so far, in call order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn check_and_record(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotConfigured(
                "Mock provider not enabled".to_string(),
            ));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        Ok(self.reply.clone().unwrap_or_else(|| {
            let prompt = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            format!("Mock response for: {}", prompt)
        }))
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        self.check_and_record(messages)
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError> {
        let reply = self.check_and_record(messages)?;

        // Split on spaces, keeping the separator with each word.
        let mut chunks: Vec<Result<String, ProviderError>> = reply
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();

        if let Some(error) = &self.stream_error {
            chunks.truncate(1);
            chunks.push(Err(ProviderError::NetworkError(error.clone())));
        }

        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn disabled_mock_is_not_configured() {
        let provider = MockLlmProvider::new(false);
        let err = provider
            .complete(&[ChatMessage::user("hi")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn stream_chunks_reassemble_reply() {
        let provider = MockLlmProvider::new(true).with_reply("The goblin flees north.");
        let stream = provider
            .stream(&[ChatMessage::user("hi")], &GenerationParams::default())
            .await
            .unwrap();

        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), "The goblin flees north.");
    }

    #[tokio::test]
    async fn records_calls() {
        let provider = MockLlmProvider::new(true);
        let reply = provider
            .complete(
                &[ChatMessage::system("sys"), ChatMessage::user("open the door")],
                &GenerationParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply, "Mock response for: open the door");
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(provider.calls()[0][0].role, Role::System);
    }
}
