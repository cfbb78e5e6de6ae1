//! Minimal key-value persistence surface.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{DebugError, Result};

/// A synchronous string key-value store.
///
/// The knowledge base snapshots itself through this trait so it stays
/// storage-agnostic (file, embedded database, or memory).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| DebugError::storage(format!("memory store poisoned: {e}")))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| DebugError::storage(format!("memory store poisoned: {e}")))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| DebugError::storage(format!("memory store poisoned: {e}")))?;
        values.remove(key);
        Ok(())
    }
}
