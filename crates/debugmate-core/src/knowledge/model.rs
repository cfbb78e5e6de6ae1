use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::suggestion::FixSuggestion;

/// A learned mapping from an error pattern to the fixes seen for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub pattern: String,
    pub fixes: Vec<FixSuggestion>,
    pub frequency: u64,
    /// Always within `[0, 1]`.
    pub success_rate: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_used_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KnowledgeEntry {
    /// Seconds elapsed since the entry was last used, never negative.
    pub fn seconds_since_last_use(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_used_at).num_seconds().max(0)
    }
}

/// Arguments of [`KnowledgeBase::add_entry`](super::KnowledgeBase::add_entry).
#[derive(Debug, Clone, PartialEq)]
pub struct NewKnowledgeEntry {
    pub pattern: String,
    pub fixes: Vec<FixSuggestion>,
    pub frequency: u64,
    pub success_rate: f64,
    pub tags: Vec<String>,
}

impl NewKnowledgeEntry {
    /// A first occurrence: frequency 1, neutral success rate.
    pub fn new(pattern: impl Into<String>, fixes: Vec<FixSuggestion>) -> Self {
        Self {
            pattern: pattern.into(),
            fixes,
            frequency: 1,
            success_rate: 0.5,
            tags: Vec::new(),
        }
    }

    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Aggregate view of the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub total_fixes: usize,
    pub average_success_rate: f64,
    pub most_frequent_pattern: Option<String>,
}
