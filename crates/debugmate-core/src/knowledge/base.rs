use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{KnowledgeEntry, KnowledgeStats, NewKnowledgeEntry};
use super::ranking::{match_score, retention_score};
use super::similarity::is_similar;
use crate::clock::{Clock, SystemClock};
use crate::config::KnowledgeConfig;
use crate::error::{DebugError, Result};
use crate::storage::KeyValueStore;
use crate::suggestion::{FixSuggestion, clamp_unit, merge_suggestions};

const SUCCESS_RATE_DECAY: f64 = 0.8;

/// In-memory knowledge base with optional key-value persistence.
///
/// Mutating methods take `&mut self`, so a merge can never be re-entered
/// while another one is in progress. When a store is attached every
/// mutation is snapshotted; save failures are logged, not returned.
pub struct KnowledgeBase {
    entries: HashMap<String, KnowledgeEntry>,
    max_entries: usize,
    storage_key: String,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl KnowledgeBase {
    /// Creates an empty, memory-only knowledge base.
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: config.max_entries.max(1),
            storage_key: config.storage_key.clone(),
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Attaches a persistence store. Call [`load`](Self::load) to read the
    /// existing snapshot.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms() as i64).unwrap_or_else(Utc::now)
    }

    // ============================================================================
    // Persistence
    // ============================================================================

    /// Replaces the in-memory map with the stored snapshot.
    ///
    /// Returns the number of entries loaded. A missing snapshot loads
    /// nothing; a malformed one fails and leaves the map untouched.
    pub fn load(&mut self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let Some(json) = store.get(&self.storage_key)? else {
            debug!("[KnowledgeBase] No snapshot under '{}'", self.storage_key);
            return Ok(0);
        };

        let pairs = Self::decode(&json)?;
        self.entries = pairs.into_iter().collect();
        self.enforce_capacity();
        info!("[KnowledgeBase] Loaded {} entries", self.entries.len());
        Ok(self.entries.len())
    }

    /// Writes the current snapshot to the attached store.
    pub fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.set(&self.storage_key, &self.export()?)
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("[KnowledgeBase] Failed to save snapshot: {}", e);
        }
    }

    fn decode(json: &str) -> Result<Vec<(String, KnowledgeEntry)>> {
        let mut pairs: Vec<(String, KnowledgeEntry)> = serde_json::from_str(json)?;
        for (id, entry) in &mut pairs {
            entry.id = id.clone();
            entry.success_rate = clamp_unit(entry.success_rate);
            for fix in &mut entry.fixes {
                fix.confidence = clamp_unit(fix.confidence);
            }
        }
        Ok(pairs)
    }

    /// Serializes all entries as a JSON array of `[id, entry]` pairs,
    /// oldest first.
    pub fn export(&self) -> Result<String> {
        let mut pairs: Vec<(&String, &KnowledgeEntry)> = self.entries.iter().collect();
        pairs.sort_by(|(ida, a), (idb, b)| a.created_at.cmp(&b.created_at).then_with(|| ida.cmp(idb)));
        Ok(serde_json::to_string(&pairs)?)
    }

    /// Merges an exported snapshot, overwriting entries with the same id.
    ///
    /// The whole payload is parsed before anything is applied: malformed
    /// JSON fails and leaves the knowledge base untouched.
    pub fn import(&mut self, json: &str) -> Result<usize> {
        let pairs = Self::decode(json)?;
        let count = pairs.len();
        self.entries.extend(pairs);
        self.enforce_capacity();
        info!("[KnowledgeBase] Imported {} entries", count);
        self.persist();
        Ok(count)
    }

    // ============================================================================
    // Mutations
    // ============================================================================

    /// Records fixes for a pattern and returns the id of the entry holding them.
    ///
    /// A similar existing pattern absorbs the new one: fixes are merged by
    /// description, frequency is summed and tags are unioned.
    pub fn add_entry(&mut self, new_entry: NewKnowledgeEntry) -> String {
        let now = self.now();
        let pattern = new_entry.pattern.trim().to_string();

        let similar_id = self
            .entries
            .values()
            .filter(|entry| is_similar(&entry.pattern, &pattern))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|entry| entry.id.clone());

        if let Some(entry) = similar_id.and_then(|id| self.entries.get_mut(&id)) {
            let id = entry.id.clone();
            merge_suggestions(&mut entry.fixes, &new_entry.fixes);
            entry.frequency = entry.frequency.saturating_add(new_entry.frequency);
            entry.last_used_at = now;
            for tag in new_entry.tags {
                if !entry.tags.contains(&tag) {
                    entry.tags.push(tag);
                }
            }
            debug!("[KnowledgeBase] Merged '{}' into '{}'", pattern, entry.pattern);
            self.persist();
            return id;
        }

        let mut fixes = Vec::new();
        merge_suggestions(&mut fixes, &new_entry.fixes);

        let id = Uuid::new_v4().to_string();
        self.entries.insert(
            id.clone(),
            KnowledgeEntry {
                id: id.clone(),
                pattern,
                fixes,
                frequency: new_entry.frequency,
                success_rate: clamp_unit(new_entry.success_rate),
                created_at: now,
                last_used_at: now,
                tags: new_entry.tags,
            },
        );
        debug!("[KnowledgeBase] Added entry {}", id);

        self.enforce_capacity();
        self.persist();
        id
    }

    /// Folds one outcome into the entry's success rate (EMA, weight 0.2).
    ///
    /// Returns the new rate.
    pub fn update_success_rate(&mut self, id: &str, success: bool) -> Result<f64> {
        let now = self.now();
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| DebugError::not_found("KnowledgeEntry", id))?;

        let outcome = if success { 1.0 } else { 0.0 };
        entry.success_rate =
            clamp_unit(entry.success_rate * SUCCESS_RATE_DECAY + outcome * (1.0 - SUCCESS_RATE_DECAY));
        entry.last_used_at = now;
        let rate = entry.success_rate;

        self.persist();
        Ok(rate)
    }

    /// Marks fix `fix_index` of an entry as used and returns it.
    pub fn record_fix_used(&mut self, id: &str, fix_index: usize) -> Result<FixSuggestion> {
        let now = self.now();
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| DebugError::not_found("KnowledgeEntry", id))?;
        let fix = entry
            .fixes
            .get(fix_index)
            .cloned()
            .ok_or_else(|| DebugError::not_found("FixSuggestion", format!("{id}#{fix_index}")))?;

        entry.frequency = entry.frequency.saturating_add(1);
        entry.last_used_at = now;

        self.persist();
        Ok(fix)
    }

    pub fn remove_entry(&mut self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    /// Evicts the lowest-retention entries beyond `max_entries`.
    fn enforce_capacity(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let now = self.now();
        let excess = self.entries.len() - self.max_entries;

        let mut ranked: Vec<(f64, String)> = self
            .entries
            .values()
            .map(|entry| (retention_score(entry, now), entry.id.clone()))
            .collect();
        ranked.sort_by(|(sa, ida), (sb, idb)| sa.total_cmp(sb).then_with(|| ida.cmp(idb)));

        for (_, id) in ranked.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        info!("[KnowledgeBase] Evicted {} entries over capacity", excess);
    }

    // ============================================================================
    // Queries
    // ============================================================================

    /// Entries relevant to `query`, best first, at most `limit`.
    pub fn find_matching_patterns(&self, query: &str, limit: usize) -> Vec<KnowledgeEntry> {
        let now = self.now();
        let mut scored: Vec<(f64, &KnowledgeEntry)> = self
            .entries
            .values()
            .map(|entry| (match_score(entry, query, now), entry))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| a.id.cmp(&b.id)));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Entries carrying `tag` (case-insensitive).
    pub fn find_by_tag(&self, tag: &str) -> Vec<&KnowledgeEntry> {
        let mut found: Vec<&KnowledgeEntry> = self
            .entries
            .values()
            .filter(|entry| entry.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .collect();
        found.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.id.cmp(&b.id)));
        found
    }

    pub fn get_entry(&self, id: &str) -> Option<&KnowledgeEntry> {
        self.entries.get(id)
    }

    /// All entries, most frequent first.
    pub fn entries(&self) -> Vec<&KnowledgeEntry> {
        let mut all: Vec<&KnowledgeEntry> = self.entries.values().collect();
        all.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> KnowledgeStats {
        let total_entries = self.entries.len();
        let average_success_rate = if total_entries == 0 {
            0.0
        } else {
            self.entries.values().map(|e| e.success_rate).sum::<f64>() / total_entries as f64
        };

        KnowledgeStats {
            total_entries,
            total_fixes: self.entries.values().map(|e| e.fixes.len()).sum(),
            average_success_rate,
            most_frequent_pattern: self.entries().first().map(|e| e.pattern.clone()),
        }
    }
}
