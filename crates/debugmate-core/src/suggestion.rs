//! Fix suggestions and the seam for applying them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::DebugSession;

/// Remediation category of a [`FixSuggestion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestionType {
    Wait,
    Timeout,
    Locator,
    Retry,
    Assertion,
    Action,
    Debug,
    Navigation,
    Auth,
    CodeChange,
    Generic,
}

/// Code before and after applying a fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeAfter {
    pub before: String,
    pub after: String,
}

/// A proposed remediation for a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSuggestion {
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub description: String,
    /// Empty when the suggestion carries no code.
    #[serde(default)]
    pub code: String,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_after: Option<BeforeAfter>,
}

impl FixSuggestion {
    /// Creates a suggestion, clamping `confidence` into `[0, 1]`.
    pub fn new(
        suggestion_type: SuggestionType,
        description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            suggestion_type,
            description: description.into(),
            code: String::new(),
            confidence: clamp_unit(confidence),
            before_after: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_before_after(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before_after = Some(BeforeAfter {
            before: before.into(),
            after: after.into(),
        });
        self
    }

    /// Key used to deduplicate suggestions by description.
    pub fn dedup_key(&self) -> String {
        self.description.trim().to_lowercase()
    }
}

/// Clamps a score into `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Merges `incoming` into `existing`, deduplicating by description and
/// keeping the higher confidence of duplicates. Confidences are clamped.
pub fn merge_suggestions(existing: &mut Vec<FixSuggestion>, incoming: &[FixSuggestion]) {
    for fix in incoming {
        let key = fix.dedup_key();
        let confidence = clamp_unit(fix.confidence);
        match existing.iter_mut().find(|f| f.dedup_key() == key) {
            Some(current) => {
                if confidence > current.confidence {
                    current.confidence = confidence;
                }
                if current.code.is_empty() && !fix.code.is_empty() {
                    current.code = fix.code.clone();
                }
            }
            None => existing.push(FixSuggestion {
                confidence,
                ..fix.clone()
            }),
        }
    }
}

/// Result reported by a [`FixRunner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub success: bool,
    pub message: String,
}

/// Applies a fix to the test under debug (patches the step, re-runs it).
///
/// The runner lives outside the assistant; the assistant only records what
/// it reports.
#[async_trait]
pub trait FixRunner: Send + Sync {
    async fn apply(&self, suggestion: &FixSuggestion, session: &DebugSession) -> Result<FixOutcome>;
}
