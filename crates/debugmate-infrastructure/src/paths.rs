//! Platform paths for DebugMate files.
//!
//! ```text
//! ~/.config/debugmate/         # Config directory
//! └── config.toml              # Assistant configuration
//!
//! ~/.local/share/debugmate/    # Data directory
//! └── knowledge.json           # Knowledge base snapshot (JsonFileStore)
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "debugmate";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

pub struct DebugMatePaths;

impl DebugMatePaths {
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Path to `config.toml`.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Default knowledge base snapshot file.
    pub fn knowledge_file() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("knowledge.json"))
    }
}
