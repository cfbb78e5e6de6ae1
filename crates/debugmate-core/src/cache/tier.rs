//! A single LRU+TTL cache tier.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::config::TierConfig;

/// A cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Insertion time (ms).
    pub timestamp: u64,
    pub access_count: u64,
    /// Last hit time (ms); insertion time until the first hit.
    pub last_access: u64,
}

/// Statistics for one cache tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    /// Fraction of lookups that hit, in `[0, 1]`.
    pub hit_rate: f64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub evicted_count: u64,
}

/// Eviction priority: the entry with the lowest score goes first.
///
/// `last_access / (access_count + 1)` approximates least recently and
/// least frequently used in one number.
pub fn eviction_score<T>(entry: &CacheEntry<T>) -> f64 {
    entry.last_access as f64 / (entry.access_count + 1) as f64
}

/// Builds a cache key from an argument tuple: each part JSON-encoded,
/// joined with `|`.
pub fn cache_key(parts: &[serde_json::Value]) -> String {
    parts
        .iter()
        .map(|part| part.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

struct TierState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    hits: u64,
    misses: u64,
    evicted: u64,
}

/// Bounded cache with lazy TTL expiry and score-based eviction.
///
/// Methods take `&self`; the tier can be handed out behind an `Arc` to the
/// component that fills it. The lock is never held across an await.
pub struct Cache<T> {
    name: String,
    max_size: usize,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
    state: Mutex<TierState<T>>,
}

impl<T: Clone> Cache<T> {
    /// Creates a tier driven by the system clock.
    pub fn new(name: impl Into<String>, config: TierConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(name: impl Into<String>, config: TierConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            max_size: config.max_size,
            ttl_ms: config.ttl_ms,
            clock,
            state: Mutex::new(TierState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evicted: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, TierState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &CacheEntry<T>, now: u64) -> bool {
        self.ttl_ms > 0 && now.saturating_sub(entry.timestamp) > self.ttl_ms
    }

    /// Returns the cached value, or `None` on miss or expiry.
    ///
    /// Expired entries are deleted on access and count as a miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now_ms();
        let mut state = self.lock();

        let expired = state.entries.get(key).map(|entry| self.is_expired(entry, now));

        if expired.is_none() {
            state.misses += 1;
            return None;
        }

        if expired == Some(true) {
            state.entries.remove(key);
            state.misses += 1;
            trace!("[Cache:{}] expired {}", self.name, key);
            return None;
        }

        state.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// Inserts a value, evicting the lowest-scored entry when full.
    pub fn set(&self, key: impl Into<String>, value: T) {
        if self.max_size == 0 {
            return;
        }

        let key = key.into();
        let now = self.clock.now_ms();
        let mut state = self.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_size {
            let victim = state
                .entries
                .iter()
                .min_by(|(ka, a), (kb, b)| {
                    eviction_score(a)
                        .total_cmp(&eviction_score(b))
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());

            if let Some(victim) = victim {
                state.entries.remove(&victim);
                state.evicted += 1;
                trace!("[Cache:{}] evicted {}", self.name, victim);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                timestamp: now,
                access_count: 0,
                last_access: now,
            },
        );
    }

    /// True when a live entry exists. Does not touch statistics.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        let state = self.lock();
        state
            .entries
            .get(key)
            .is_some_and(|entry| !self.is_expired(entry, now))
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Drops all entries; statistics are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        if self.ttl_ms == 0 {
            return 0;
        }
        let now = self.clock.now_ms();
        let ttl = self.ttl_ms;
        let mut state = self.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| now.saturating_sub(entry.timestamp) <= ttl);
        before - state.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
            total_hits: state.hits,
            total_misses: state.misses,
            evicted_count: state.evicted,
        }
    }

    /// Returns the cached value or computes, stores and returns it.
    pub fn get_or_set<F>(&self, key: &str, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone());
        value
    }

    /// Async variant of [`get_or_set`](Self::get_or_set) for fallible fetches.
    ///
    /// Failures are not cached. Concurrent misses for one key are not
    /// deduplicated; only sequential repeats hit.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn tier(max_size: usize, ttl_ms: u64) -> (Cache<String>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let cache = Cache::with_clock("test", TierConfig::new(max_size, ttl_ms), Arc::new(clock.clone()));
        (cache, clock)
    }

    #[test]
    fn test_miss_then_hit() {
        let (cache, _) = tier(4, 0);
        assert_eq!(cache.get("a"), None);

        cache.set("a", "1".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("1"));

        let stats = cache.stats();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.total_misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let (cache, clock) = tier(3, 0);
        for i in 0..4 {
            cache.set(format!("k{i}"), i.to_string());
            clock.advance(10);
        }

        let stats = cache.stats();
        assert!(stats.size <= 3);
        assert!(stats.evicted_count >= 1);
        // Oldest untouched entry has the lowest score.
        assert!(!cache.contains("k0"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let (cache, _) = tier(2, 0);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("a", "3".to_string());

        assert_eq!(cache.stats().evicted_count, 0);
        assert_eq!(cache.get("a").as_deref(), Some("3"));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (cache, clock) = tier(4, 100);
        cache.set("a", "1".to_string());
        clock.advance(101);

        assert_eq!(cache.get("a"), None);
        let stats = cache.stats();
        assert_eq!(stats.total_misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let (cache, clock) = tier(4, 0);
        cache.set("a", "1".to_string());
        clock.advance(365 * 24 * 3600 * 1000);
        assert_eq!(cache.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_cleanup_expired_sweeps_only_stale() {
        let (cache, clock) = tier(4, 100);
        cache.set("old", "1".to_string());
        clock.advance(80);
        cache.set("new", "2".to_string());
        clock.advance(30);

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.contains("new"));
    }

    #[test]
    fn test_eviction_score_ranks_older_access_first() {
        let stale = CacheEntry { value: (), timestamp: 0, access_count: 1, last_access: 1_000 };
        let recent = CacheEntry { value: (), timestamp: 0, access_count: 1, last_access: 5_000 };
        assert!(eviction_score(&stale) < eviction_score(&recent));
        assert_eq!(eviction_score(&stale), 500.0);
    }

    #[test]
    fn test_cache_key_joins_json_parts() {
        assert_eq!(cache_key(&[json!("a"), json!(1), json!({"x": true})]), r#""a"|1|{"x":true}"#);
    }

    #[tokio::test]
    async fn test_get_or_fetch_only_fetches_once() {
        let (cache, _) = tier(4, 0);
        let mut calls = 0;

        for _ in 0..3 {
            let value: Result<String, ()> = cache
                .get_or_fetch("k", || {
                    calls += 1;
                    async { Ok("v".to_string()) }
                })
                .await;
            assert_eq!(value.unwrap(), "v");
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_does_not_cache_errors() {
        let (cache, _) = tier(4, 0);
        let result: Result<String, &str> = cache.get_or_fetch("k", || async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(!cache.contains("k"));
    }
}
