pub mod classify;
pub mod kb;
pub mod parse;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use debugmate_core::config::AssistantConfig;
use debugmate_core::knowledge::KnowledgeBase;
use debugmate_infrastructure::{ConfigService, DebugMatePaths, JsonFileStore};

pub fn load_config() -> AssistantConfig {
    ConfigService::new().get_config()
}

/// Opens the knowledge base backed by `path` (or the default file).
pub fn open_knowledge_base(path: Option<&Path>, config: &AssistantConfig) -> Result<KnowledgeBase> {
    let path: PathBuf = match path {
        Some(path) => path.to_path_buf(),
        None => DebugMatePaths::knowledge_file().context("Failed to resolve the knowledge base path")?,
    };

    let mut knowledge = KnowledgeBase::new(&config.knowledge).with_store(Arc::new(JsonFileStore::new(&path)));
    let loaded = knowledge
        .load()
        .with_context(|| format!("Failed to load knowledge base from {}", path.display()))?;
    tracing::debug!("[CLI] loaded {} knowledge entries from {}", loaded, path.display());
    Ok(knowledge)
}
