//! HTTP client for the DMancipate API.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Chat replies can take minutes on local models.
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(600);
pub const RESET_TIMEOUT: Duration = Duration::from_secs(30);
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Could not connect to DMancipate API at {0}. Make sure the DMancipate server is running.")]
    Connect(String),

    #[error("DMancipate API is not responding. Make sure the server is running.")]
    NotResponding,

    #[error("Prompt is required for this action. Use 'dmancipate --help' for usage information.")]
    MissingPrompt,

    #[error("Request timed out. The DM might be thinking too hard!")]
    Timeout,

    /// Non-2xx reply; holds the server's `error` field or `HTTP <status>`.
    #[error("{0}")]
    Server(String),

    #[error("Invalid response from server")]
    InvalidResponse,

    #[error("{0}")]
    Stream(String),

    #[error("Request failed - {0}")]
    Request(reqwest::Error),
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ChatPayload<'a> {
    pub prompt: &'a str,
    pub action: &'a str,
    pub enable_stream: &'a str,
}

impl<'a> ChatPayload<'a> {
    pub fn new(action: &'a str, prompt: &'a str, stream: bool) -> Self {
        Self {
            prompt,
            action,
            enable_stream: if stream { "True" } else { "False" },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResult {
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    content: String,
    #[serde(default)]
    error: Option<String>,
}

pub struct DmClient {
    base_url: String,
    client: reqwest::Client,
}

impl DmClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout
        } else if error.is_connect() {
            ClientError::Connect(self.base_url.clone())
        } else {
            ClientError::Request(error)
        }
    }

    /// True when `GET /health` answers 200.
    pub async fn check_health(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    /// Send a turn and wait for the whole reply.
    pub async fn chat(&self, action: &str, prompt: &str) -> Result<String, ClientError> {
        let response = self.post_chat(action, prompt, false).await?;
        let body: ChatResult = response
            .json()
            .await
            .map_err(|_| ClientError::InvalidResponse)?;
        Ok(body.result.unwrap_or_else(|| "No response received".to_string()))
    }

    /// Send a turn and hand each delta to `on_delta` as it arrives.
    /// Returns the full reply.
    pub async fn chat_stream<F>(
        &self,
        action: &str,
        prompt: &str,
        mut on_delta: F,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        let response = self.post_chat(action, prompt, true).await?;
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut reply = String::new();

        loop {
            let chunk = body.next().await;
            let done = chunk.is_none();
            if let Some(chunk) = chunk {
                buffer.extend_from_slice(&chunk.map_err(|e| self.classify(e))?);
            } else {
                buffer.push(b'\n');
            }

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(delta) = parse_stream_line(line.trim())? {
                    on_delta(&delta);
                    reply.push_str(&delta);
                }
            }

            if done {
                return Ok(reply);
            }
        }
    }

    /// Delete all campaign history. Returns the server's confirmation.
    pub async fn reset_campaign(&self) -> Result<String, ClientError> {
        let response = self
            .client
            .delete(self.url("/chat"))
            .timeout(RESET_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let response = ensure_success(response).await?;

        let body: MessageBody = response
            .json()
            .await
            .map_err(|_| ClientError::InvalidResponse)?;
        Ok(body
            .message
            .unwrap_or_else(|| "Campaign history reset successfully".to_string()))
    }

    async fn post_chat(
        &self,
        action: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, ClientError> {
        tracing::debug!(action, stream, "Sending chat request");

        let response = self
            .client
            .post(self.url("/chat"))
            .timeout(CHAT_TIMEOUT)
            .json(&ChatPayload::new(action, prompt, stream))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Server(server_error_message(status.as_u16(), &body)))
}

/// The `error` field of a JSON error body, or `HTTP <status>`.
pub fn server_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status))
}

fn parse_stream_line(line: &str) -> Result<Option<String>, ClientError> {
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: StreamLine = serde_json::from_str(line).map_err(|_| ClientError::InvalidResponse)?;
    if let Some(error) = parsed.error {
        return Err(ClientError::Stream(error));
    }
    Ok(Some(parsed.content).filter(|c| !c.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_sends_stream_flag_as_string() {
        let payload = ChatPayload::new("look", "I examine the door", false);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({
                "prompt": "I examine the door",
                "action": "look",
                "enable_stream": "False"
            })
        );
        assert_eq!(ChatPayload::new("look", "x", true).enable_stream, "True");
    }

    #[test]
    fn server_error_prefers_error_field() {
        assert_eq!(
            server_error_message(400, r#"{"error": "Missing 'prompt' parameter"}"#),
            "Missing 'prompt' parameter"
        );
        assert_eq!(server_error_message(502, "<html>Bad Gateway</html>"), "HTTP 502");
        assert_eq!(server_error_message(500, r#"{"details": "x"}"#), "HTTP 500");
    }

    #[test]
    fn stream_lines_yield_content_or_error() {
        assert_eq!(
            parse_stream_line(r#"{"content": "Roll "}"#).unwrap(),
            Some("Roll ".to_string())
        );
        assert_eq!(parse_stream_line("").unwrap(), None);
        assert!(matches!(
            parse_stream_line(r#"{"content": "", "error": "streaming error: boom"}"#),
            Err(ClientError::Stream(ref m)) if m == "streaming error: boom"
        ));
        assert!(matches!(
            parse_stream_line("garbage"),
            Err(ClientError::InvalidResponse)
        ));
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = DmClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
    }
}
