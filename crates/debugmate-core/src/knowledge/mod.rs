//! Error-pattern knowledge base.
//!
//! Stores `pattern -> fixes` entries, merges near-duplicate patterns on
//! insert, ranks entries against a query and learns which fixes work.

mod base;
mod model;
mod pattern;
mod ranking;
mod similarity;

pub use base::KnowledgeBase;
pub use model::{KnowledgeEntry, KnowledgeStats, NewKnowledgeEntry};
pub use pattern::extract_error_pattern;
pub use ranking::{match_score, recency_bonus, retention_score};
pub use similarity::{SHORT_TOKEN_MAX_LEN, is_similar, word_overlap};
