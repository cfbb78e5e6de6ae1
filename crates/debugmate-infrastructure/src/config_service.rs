//! Configuration service implementation.
//!
//! Loads [`AssistantConfig`] from `~/.config/debugmate/config.toml` and
//! applies environment overrides on top.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use debugmate_core::config::AssistantConfig;
use debugmate_core::error::{DebugError, Result};
use tracing::{debug, warn};

use crate::paths::DebugMatePaths;

/// Environment variable holding the Anthropic API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "DEBUGMATE_MODEL";

/// Loads and caches the assistant configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    config: Arc<RwLock<Option<AssistantConfig>>>,
}

impl ConfigService {
    /// Service reading the platform config file.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Service reading an explicit file instead of the platform default.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the configuration, loading it on first access.
    ///
    /// An unreadable file falls back to defaults (with a warning).
    pub fn get_config(&self) -> AssistantConfig {
        {
            let read_lock = self.config.read().unwrap_or_else(|p| p.into_inner());
            if let Some(ref cached) = *read_lock {
                return cached.clone();
            }
        }

        let loaded = self.load().unwrap_or_else(|e| {
            warn!("[ConfigService] Using default config: {}", e);
            AssistantConfig::default()
        });
        let loaded = apply_env_overrides(loaded, |key| std::env::var(key).ok());

        {
            let mut write_lock = self.config.write().unwrap_or_else(|p| p.into_inner());
            *write_lock = Some(loaded.clone());
        }

        loaded
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(|p| p.into_inner());
        *write_lock = None;
    }

    fn config_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => DebugMatePaths::config_file().map_err(|e| DebugError::config(e.to_string())),
        }
    }

    fn load(&self) -> Result<AssistantConfig> {
        load_config_file(&self.config_path()?)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a TOML config file; a missing file yields the defaults.
pub fn load_config_file(path: &Path) -> Result<AssistantConfig> {
    if !path.exists() {
        debug!("[ConfigService] No config at {}", path.display());
        return Ok(AssistantConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Applies `ANTHROPIC_API_KEY` and `DEBUGMATE_MODEL` from `lookup`.
pub fn apply_env_overrides<F>(mut config: AssistantConfig, lookup: F) -> AssistantConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
        config.llm.api_key = Some(key);
    }
    if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
        config.llm.model = model;
    }
    config
}
