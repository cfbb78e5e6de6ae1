//! Assistant configuration model.
//!
//! Every field has a default so partial TOML files are accepted.

use serde::{Deserialize, Serialize};

/// Reply language for assistant-authored text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub language: Language,
    /// Conversation ring size.
    pub max_history: usize,
    /// Execute parsed actions right after each reply.
    pub auto_execute_actions: bool,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub knowledge: KnowledgeConfig,
    pub executor: ExecutorConfig,
    pub context: ContextConfig,
    pub suggestions: SuggestionConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            max_history: 50,
            auto_execute_actions: false,
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            knowledge: KnowledgeConfig::default(),
            executor: ExecutorConfig::default(),
            context: ContextConfig::default(),
            suggestions: SuggestionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Usually supplied through `ANTHROPIC_API_KEY` instead.
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout_secs: 60,
            api_key: None,
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
        }
    }
}

/// Size and TTL of one cache tier. A TTL of 0 disables expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub max_size: usize,
    pub ttl_ms: u64,
}

impl TierConfig {
    pub const fn new(max_size: usize, ttl_ms: u64) -> Self {
        Self { max_size, ttl_ms }
    }
}

/// Sizes and TTLs of the six cache tiers.
///
/// | Tier | Size | TTL |
/// |------|------|-----|
/// | `llm` | 50 | 30 min |
/// | `diagnostics` | 20 | 5 s |
/// | `screenshots` | 10 | 60 s |
/// | `context` | 20 | 10 s |
/// | `elements` | 100 | 30 s |
/// | `fixes` | 100 | 1 h |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub llm: TierConfig,
    pub diagnostics: TierConfig,
    pub screenshots: TierConfig,
    pub context: TierConfig,
    pub elements: TierConfig,
    pub fixes: TierConfig,
    /// Minimum spacing between expired-entry sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            llm: TierConfig::new(50, 30 * 60 * 1000),
            diagnostics: TierConfig::new(20, 5 * 1000),
            screenshots: TierConfig::new(10, 60 * 1000),
            context: TierConfig::new(20, 10 * 1000),
            elements: TierConfig::new(100, 30 * 1000),
            fixes: TierConfig::new(100, 60 * 60 * 1000),
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub max_entries: usize,
    pub storage_key: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            storage_key: "debug_knowledge_base".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub default_wait_ms: u64,
    pub max_wait_ms: u64,
    pub highlight_duration_ms: u64,
    pub scroll_amount: i64,
    /// Try the AI-driven strategy before the manual one.
    pub prefer_ai: bool,
    /// Polling interval while waiting for an element.
    pub poll_interval_ms: u64,
    /// Screenshots kept for later comparison.
    pub max_snapshots: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: 1000,
            max_wait_ms: 30_000,
            highlight_duration_ms: 3000,
            scroll_amount: 500,
            prefer_ai: true,
            poll_interval_ms: 250,
            max_snapshots: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_history_messages: usize,
    /// Character budget of the whole prompt.
    pub max_context_chars: usize,
    pub max_console_errors: usize,
    pub max_network_errors: usize,
    pub max_visible_elements: usize,
    pub max_execution_history: usize,
    pub include_screenshot: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history_messages: 10,
            max_context_chars: 16_000,
            max_console_errors: 10,
            max_network_errors: 10,
            max_visible_elements: 30,
            max_execution_history: 10,
            include_screenshot: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub max_suggestions: usize,
    pub min_confidence: f64,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_suggestions: 5,
            min_confidence: 0.3,
        }
    }
}
