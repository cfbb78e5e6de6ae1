//! LLM client seam.
//!
//! The HTTP client itself lives in `debugmate-interaction`; the orchestrator
//! only depends on [`LlmClient`].

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Uniform prefix of every LLM failure message.
pub const LLM_ERROR_PREFIX: &str = "LLM request failed: ";

/// An LLM call failed (network, non-2xx, or malformed reply).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("LLM request failed: {message}")]
pub struct LlmError {
    pub message: String,
    pub status: Option<u16>,
    pub retryable: bool,
}

impl LlmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            retryable: false,
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: format!("HTTP {status}: {}", message.into()),
            status: Some(status),
            retryable: matches!(status, 429 | 500 | 502 | 503 | 504),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: content.into(),
        }
    }
}

/// A base64 image sent alongside the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub media_type: String,
    pub data: String,
}

impl ImageAttachment {
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            media_type: "image/png".to_string(),
            data: data.into(),
        }
    }
}

/// Backend-neutral completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system: String,
    pub messages: Vec<LlmMessage>,
    /// Injected as extra user messages after the conversation.
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// Rough character count, used for prompt budgeting.
    pub fn char_len(&self) -> usize {
        self.system.len() + self.messages.iter().map(|m| m.content.len()).sum::<usize>()
    }
}

/// Stream of text deltas; ends normally or yields one error and stops.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError>;

    /// Streams the reply as text deltas.
    ///
    /// The default implementation delivers the full completion as one chunk.
    async fn stream(&self, request: LlmRequest) -> Result<TextStream, LlmError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_uniform_prefix() {
        let err = LlmError::http(503, "overloaded");
        assert!(err.to_string().starts_with(LLM_ERROR_PREFIX));
        assert!(err.retryable);
        assert!(!LlmError::http(400, "bad").retryable);
    }
}
