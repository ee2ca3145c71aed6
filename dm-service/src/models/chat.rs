//! Wire types for the chat endpoint.

use crate::models::Action;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Raw `POST /chat` body. Every field is optional so that missing fields
/// produce a descriptive 400 instead of a generic deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequestBody {
    pub prompt: Option<String>,
    /// `None` only when the key is absent; an explicit `null` is kept.
    #[serde(default, deserialize_with = "present")]
    pub enable_stream: Option<serde_json::Value>,
    pub action: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// A validated chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub prompt: String,
    pub enable_stream: bool,
    pub action: Action,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatRequestError {
    #[error("Missing JSON body")]
    MissingBody,

    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    #[error("Invalid boolean value for 'enable_stream': {0}")]
    InvalidStreamFlag(String),

    #[error("Missing 'prompt' parameter")]
    MissingPrompt,

    #[error("Missing 'action' parameter")]
    MissingAction,

    #[error("Invalid action '{0}'. Allowed actions: {1}")]
    InvalidAction(String, String),
}

impl ChatRequest {
    /// Parse and validate a raw request body. Bodies that are empty, not
    /// JSON, or not a non-empty object count as missing.
    pub fn parse(raw: &[u8]) -> Result<Self, ChatRequestError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ChatRequestError::MissingBody);
        }

        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|_| ChatRequestError::MissingBody)?;
        match &value {
            serde_json::Value::Object(map) if map.is_empty() => {
                return Err(ChatRequestError::MissingBody)
            }
            serde_json::Value::Object(_) => {}
            _ => return Err(ChatRequestError::MissingBody),
        }

        let body: ChatRequestBody = serde_json::from_value(value)
            .map_err(|e| ChatRequestError::InvalidBody(e.to_string()))?;
        Self::from_body(body)
    }

    pub fn from_body(body: ChatRequestBody) -> Result<Self, ChatRequestError> {
        let enable_stream = match body.enable_stream {
            None => false,
            Some(serde_json::Value::String(flag)) => parse_stream_flag(&flag)
                .ok_or(ChatRequestError::InvalidStreamFlag(flag))?,
            Some(serde_json::Value::Null) => {
                return Err(ChatRequestError::InvalidStreamFlag("None".to_string()))
            }
            Some(other) => return Err(ChatRequestError::InvalidStreamFlag(other.to_string())),
        };

        let prompt = body.prompt.ok_or(ChatRequestError::MissingPrompt)?;

        let raw_action = body.action.ok_or(ChatRequestError::MissingAction)?;
        let action = raw_action
            .parse::<Action>()
            .ok()
            .filter(Action::is_chat_action)
            .ok_or_else(|| ChatRequestError::InvalidAction(raw_action, allowed_actions()))?;

        Ok(ChatRequest {
            prompt,
            enable_stream,
            action,
        })
    }
}

/// `True`/`False` in either capitalisation; anything else is rejected.
fn parse_stream_flag(flag: &str) -> Option<bool> {
    match flag {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => None,
    }
}

fn allowed_actions() -> String {
    Action::chat_actions()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Non-streaming reply.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub result: String,
}

/// One newline-delimited JSON object of a streamed reply.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamLine {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamLine {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: None,
        }
    }

    pub fn error(error: impl std::fmt::Display) -> Self {
        Self {
            content: String::new(),
            error: Some(format!("streaming error: {}", error)),
        }
    }

    /// Serialize as a single NDJSON line.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{\"content\":\"\"}".to_string());
        line.push('\n');
        line
    }
}

/// Generic `{"message": ...}` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
