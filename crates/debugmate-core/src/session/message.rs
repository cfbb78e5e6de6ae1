//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::DebugAction;
use crate::context::ContextRequest;
use crate::suggestion::FixSuggestion;

/// Represents the role of a message in a debugging conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the operator.
    User,
    /// Reply produced by the assistant.
    Assistant,
}

/// A single turn in the conversation history.
///
/// Messages are created once per turn and never mutated after they are
/// appended to a [`ConversationHistory`](super::ConversationHistory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<DebugAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<FixSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_request: Option<ContextRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            actions: Vec::new(),
            suggestions: Vec::new(),
            context_request: None,
            metadata: None,
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn with_actions(mut self, actions: Vec<DebugAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<FixSuggestion>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context_request(mut self, request: Option<ContextRequest>) -> Self {
        self.context_request = request;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}
