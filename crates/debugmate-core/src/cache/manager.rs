//! The six cache tiers used by the assistant.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::tier::{Cache, CacheStats, cache_key};
use crate::agent::LocatedElement;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::context::DebugContext;
use crate::suggestion::FixSuggestion;

/// Per-tier statistics plus aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheManagerStats {
    pub llm: CacheStats,
    pub diagnostics: CacheStats,
    pub screenshots: CacheStats,
    pub context: CacheStats,
    pub elements: CacheStats,
    pub fixes: CacheStats,
    pub total_size: usize,
    /// Hits over lookups across all tiers, in `[0, 1]`.
    pub overall_hit_rate: f64,
}

/// Owns one cache per expensive boundary.
///
/// | Tier | Holds | Keyed by |
/// |------|-------|----------|
/// | llm | model replies | failure pattern + query |
/// | diagnostics | collected page state | page URL |
/// | screenshots | base64 captures | page URL |
/// | context | merged session snapshots | session id |
/// | elements | AI-located elements | description |
/// | fixes | generated suggestions | error + URL |
pub struct CacheManager {
    llm: Arc<Cache<String>>,
    diagnostics: Arc<Cache<DebugContext>>,
    screenshots: Arc<Cache<String>>,
    context: Arc<Cache<DebugContext>>,
    elements: Arc<Cache<Vec<LocatedElement>>>,
    fixes: Arc<Cache<Vec<FixSuggestion>>>,
    clock: Arc<dyn Clock>,
    sweep_interval_ms: u64,
    last_sweep_ms: AtomicU64,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            llm: Arc::new(Cache::with_clock("llm", config.llm, clock.clone())),
            diagnostics: Arc::new(Cache::with_clock("diagnostics", config.diagnostics, clock.clone())),
            screenshots: Arc::new(Cache::with_clock("screenshots", config.screenshots, clock.clone())),
            context: Arc::new(Cache::with_clock("context", config.context, clock.clone())),
            elements: Arc::new(Cache::with_clock("elements", config.elements, clock.clone())),
            fixes: Arc::new(Cache::with_clock("fixes", config.fixes, clock.clone())),
            clock,
            sweep_interval_ms: config.sweep_interval_secs * 1000,
            last_sweep_ms: AtomicU64::new(now),
        }
    }

    // ============================================================================
    // LLM replies
    // ============================================================================

    pub fn llm_key(query: &str, context_key: &str) -> String {
        cache_key(&[json!(query), json!(context_key)])
    }

    pub fn get_llm_response(&self, query: &str, context_key: &str) -> Option<String> {
        self.llm.get(&Self::llm_key(query, context_key))
    }

    pub fn set_llm_response(&self, query: &str, context_key: &str, response: String) {
        self.llm.set(Self::llm_key(query, context_key), response);
    }

    /// Returns a cached reply or awaits `fetch` and caches its success.
    pub async fn get_or_fetch_llm<F, Fut, E>(&self, query: &str, context_key: &str, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        self.llm.get_or_fetch(&Self::llm_key(query, context_key), fetch).await
    }

    // ============================================================================
    // Page diagnostics
    // ============================================================================

    pub fn get_diagnostics(&self, url: &str) -> Option<DebugContext> {
        self.diagnostics.get(&cache_key(&[json!(url)]))
    }

    pub fn set_diagnostics(&self, url: &str, diagnostics: DebugContext) {
        self.diagnostics.set(cache_key(&[json!(url)]), diagnostics);
    }

    pub async fn get_or_fetch_diagnostics<F, Fut, E>(&self, url: &str, fetch: F) -> Result<DebugContext, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DebugContext, E>>,
    {
        self.diagnostics.get_or_fetch(&cache_key(&[json!(url)]), fetch).await
    }

    // ============================================================================
    // Screenshots
    // ============================================================================

    pub fn screenshot_key(url: &str) -> String {
        cache_key(&[json!(url)])
    }

    /// Shared handle to the screenshot tier, for the diagnostics collector.
    pub fn screenshot_cache(&self) -> Arc<Cache<String>> {
        self.screenshots.clone()
    }

    pub fn get_screenshot(&self, url: &str) -> Option<String> {
        self.screenshots.get(&Self::screenshot_key(url))
    }

    pub fn set_screenshot(&self, url: &str, screenshot: String) {
        self.screenshots.set(Self::screenshot_key(url), screenshot);
    }

    // ============================================================================
    // Context snapshots
    // ============================================================================

    pub fn get_context(&self, session_id: &str) -> Option<DebugContext> {
        self.context.get(&cache_key(&[json!(session_id)]))
    }

    pub fn set_context(&self, session_id: &str, context: DebugContext) {
        self.context.set(cache_key(&[json!(session_id)]), context);
    }

    /// Forgets everything cached about the live page, e.g. after an action
    /// changed it.
    pub fn invalidate_page_state(&self, session_id: &str) {
        self.context.remove(&cache_key(&[json!(session_id)]));
        self.diagnostics.clear();
        self.screenshots.clear();
    }

    // ============================================================================
    // Element locations
    // ============================================================================

    /// Shared handle to the element-location tier, for the executor.
    pub fn element_cache(&self) -> Arc<Cache<Vec<LocatedElement>>> {
        self.elements.clone()
    }

    pub fn get_element(&self, description: &str) -> Option<Vec<LocatedElement>> {
        self.elements.get(&cache_key(&[json!(description)]))
    }

    pub fn set_element(&self, description: &str, elements: Vec<LocatedElement>) {
        self.elements.set(cache_key(&[json!(description)]), elements);
    }

    // ============================================================================
    // Fix suggestions
    // ============================================================================

    pub fn fix_key(error_message: &str, url: &str) -> String {
        cache_key(&[json!(error_message), json!(url)])
    }

    pub fn get_fix_suggestions(&self, error_message: &str, url: &str) -> Option<Vec<FixSuggestion>> {
        self.fixes.get(&Self::fix_key(error_message, url))
    }

    pub fn set_fix_suggestions(&self, error_message: &str, url: &str, fixes: Vec<FixSuggestion>) {
        self.fixes.set(Self::fix_key(error_message, url), fixes);
    }

    pub fn get_or_compute_fix_suggestions<F>(&self, error_message: &str, url: &str, compute: F) -> Vec<FixSuggestion>
    where
        F: FnOnce() -> Vec<FixSuggestion>,
    {
        self.fixes.get_or_set(&Self::fix_key(error_message, url), compute)
    }

    /// Drops cached suggestions, e.g. after the knowledge base learned something.
    pub fn invalidate_fix_suggestions(&self) {
        self.fixes.clear();
    }

    // ============================================================================
    // Maintenance
    // ============================================================================

    /// Removes expired entries from every tier.
    pub fn cleanup_expired(&self) -> usize {
        let removed = self.llm.cleanup_expired()
            + self.diagnostics.cleanup_expired()
            + self.screenshots.cleanup_expired()
            + self.context.cleanup_expired()
            + self.elements.cleanup_expired()
            + self.fixes.cleanup_expired();
        self.last_sweep_ms.store(self.clock.now_ms(), Ordering::SeqCst);
        if removed > 0 {
            debug!("[CacheManager] Swept {} expired entries", removed);
        }
        removed
    }

    /// Runs [`cleanup_expired`](Self::cleanup_expired) when the sweep
    /// interval has elapsed. Returns the number removed when a sweep ran.
    pub fn maybe_sweep(&self) -> Option<usize> {
        let now = self.clock.now_ms();
        let last = self.last_sweep_ms.load(Ordering::SeqCst);
        if now.saturating_sub(last) < self.sweep_interval_ms {
            return None;
        }
        Some(self.cleanup_expired())
    }

    pub fn clear_all(&self) {
        self.llm.clear();
        self.diagnostics.clear();
        self.screenshots.clear();
        self.context.clear();
        self.elements.clear();
        self.fixes.clear();
    }

    pub fn stats(&self) -> CacheManagerStats {
        let tiers = [
            self.llm.stats(),
            self.diagnostics.stats(),
            self.screenshots.stats(),
            self.context.stats(),
            self.elements.stats(),
            self.fixes.stats(),
        ];
        let total_size = tiers.iter().map(|s| s.size).sum();
        let hits: u64 = tiers.iter().map(|s| s.total_hits).sum();
        let lookups: u64 = tiers.iter().map(|s| s.total_hits + s.total_misses).sum();
        let [llm, diagnostics, screenshots, context, elements, fixes] = tiers;

        CacheManagerStats {
            llm,
            diagnostics,
            screenshots,
            context,
            elements,
            fixes,
            total_size,
            overall_hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
