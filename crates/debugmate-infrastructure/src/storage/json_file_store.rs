use std::collections::BTreeMap;
use std::path::PathBuf;

use debugmate_core::error::Result;
use debugmate_core::storage::KeyValueStore;
use tracing::debug;

use super::atomic_json::AtomicJsonFile;

/// [`KeyValueStore`] backed by a single JSON object file.
///
/// Every write is a locked read-modify-write, so two processes sharing the
/// file never lose each other's keys.
pub struct JsonFileStore {
    file: AtomicJsonFile<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: AtomicJsonFile::new(path.into()),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .file
            .load()?
            .and_then(|values| values.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("[JsonFileStore] set '{}' in {}", key, self.file.path().display());
        self.file.update(BTreeMap::new(), |values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.file.update(BTreeMap::new(), |values| {
            values.remove(key);
        })
    }
}
