//! Ranking heuristics for lookup and retention.

use chrono::{DateTime, Utc};

use super::model::KnowledgeEntry;

const CONTAINMENT_SCORE: f64 = 10.0;
const WORD_SCORE: f64 = 2.0;
const TAG_SCORE: f64 = 3.0;
const SIGNIFICANT_QUERY_WORD_LEN: usize = 2;

const WEEK_SECS: i64 = 7 * 24 * 3600;
const MONTH_SECS: i64 = 30 * 24 * 3600;

/// +2 when used within a week, +1 within a month.
pub fn recency_bonus(entry: &KnowledgeEntry, now: DateTime<Utc>) -> f64 {
    let age = entry.seconds_since_last_use(now);
    if age < WEEK_SECS {
        2.0
    } else if age < MONTH_SECS {
        1.0
    } else {
        0.0
    }
}

/// Relevance of `entry` to `query`. Zero means no match.
///
/// Textual matches (containment, shared words, tags) gate the score;
/// frequency, success rate and recency only boost entries that matched.
pub fn match_score(entry: &KnowledgeEntry, query: &str, now: DateTime<Utc>) -> f64 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }
    let pattern = entry.pattern.to_lowercase();

    let mut score = 0.0;
    if pattern.contains(&query) || query.contains(&pattern) {
        score += CONTAINMENT_SCORE;
    }

    score += query
        .split_whitespace()
        .filter(|word| word.chars().count() > SIGNIFICANT_QUERY_WORD_LEN && pattern.contains(word))
        .count() as f64
        * WORD_SCORE;

    score += entry
        .tags
        .iter()
        .map(|tag| tag.to_lowercase())
        .filter(|tag| !tag.is_empty() && (query.contains(tag.as_str()) || tag.contains(&query)))
        .count() as f64
        * TAG_SCORE;

    if score == 0.0 {
        return 0.0;
    }

    score
        + 2.0 * ((entry.frequency + 1) as f64).log10()
        + 5.0 * entry.success_rate
        + recency_bonus(entry, now)
}

/// Keep-priority under capacity pressure; the lowest is evicted first.
pub fn retention_score(entry: &KnowledgeEntry, now: DateTime<Utc>) -> f64 {
    entry.success_rate * 100.0 + (10_000 - entry.seconds_since_last_use(now)) as f64
}
