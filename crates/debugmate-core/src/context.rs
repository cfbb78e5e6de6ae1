//! Failure snapshot types and the diagnostics collector seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The last error raised by the failing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            stack: None,
            timestamp: Utc::now(),
        }
    }
}

/// A failed network request observed on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkError {
    pub url: String,
    #[serde(default)]
    pub status: Option<u16>,
    pub message: String,
}

/// A compact description of one visible element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub selector: Option<String>,
}

/// One executed test step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub step_index: usize,
    pub description: String,
    pub success: bool,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Snapshot of the failure state.
///
/// Rebuilt for every analysis request; callers replace it instead of
/// mutating it in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugContext {
    pub url: Option<String>,
    pub title: Option<String>,
    pub step_description: Option<String>,
    pub step_index: Option<usize>,
    pub last_error: Option<ErrorInfo>,
    /// Base64 PNG of the page.
    pub screenshot: Option<String>,
    #[serde(default)]
    pub console_errors: Vec<String>,
    #[serde(default)]
    pub network_errors: Vec<NetworkError>,
    #[serde(default)]
    pub visible_elements: Vec<ElementSummary>,
    #[serde(default)]
    pub execution_history: Vec<ExecutionRecord>,
}

impl DebugContext {
    /// Returns a copy keeping only the last `n` execution records.
    pub fn with_history_tail(mut self, n: usize) -> Self {
        let skip = self.execution_history.len().saturating_sub(n);
        self.execution_history = self.execution_history.split_off(skip);
        self
    }

    /// Layers freshly collected page state over this snapshot.
    ///
    /// Fields the collector could not observe keep their previous values.
    pub fn merged_with(&self, fresh: DebugContext) -> DebugContext {
        DebugContext {
            url: fresh.url.or_else(|| self.url.clone()),
            title: fresh.title.or_else(|| self.title.clone()),
            step_description: fresh
                .step_description
                .or_else(|| self.step_description.clone()),
            step_index: fresh.step_index.or(self.step_index),
            last_error: fresh.last_error.or_else(|| self.last_error.clone()),
            screenshot: fresh.screenshot.or_else(|| self.screenshot.clone()),
            console_errors: non_empty_or(fresh.console_errors, &self.console_errors),
            network_errors: non_empty_or(fresh.network_errors, &self.network_errors),
            visible_elements: non_empty_or(fresh.visible_elements, &self.visible_elements),
            execution_history: non_empty_or(fresh.execution_history, &self.execution_history),
        }
    }
}

fn non_empty_or<T: Clone>(fresh: Vec<T>, previous: &[T]) -> Vec<T> {
    if fresh.is_empty() {
        previous.to_vec()
    } else {
        fresh
    }
}

/// The diagnostic slice an LLM reply can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContextKind {
    ConsoleErrors,
    NetworkErrors,
    VisibleElements,
    ExecutionHistory,
    Screenshot,
}

impl ContextKind {
    /// Resolves a tag token (case-insensitive) to a context kind.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().replace('-', "_").as_str() {
            "console" | "console_errors" | "console_logs" | "logs" => Some(Self::ConsoleErrors),
            "network" | "network_errors" | "requests" => Some(Self::NetworkErrors),
            "elements" | "visible_elements" | "dom" => Some(Self::VisibleElements),
            "history" | "execution_history" | "steps" => Some(Self::ExecutionHistory),
            "screenshot" | "image" => Some(Self::Screenshot),
            _ => None,
        }
    }
}

/// A request, issued by the LLM, to inject a diagnostic slice next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub kind: ContextKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Source of live page diagnostics.
///
/// Implementations read from the page under test; results are cached by the
/// orchestrator in the short-lived diagnostics tier.
#[async_trait]
pub trait DiagnosticsCollector: Send + Sync {
    async fn collect(&self) -> Result<DebugContext>;
}
