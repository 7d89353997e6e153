//! Relational storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_path() -> PathBuf {
    PathBuf::from("data/loess.db")
}

/// SQLite settings for conversations, messages and API keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

impl StorageConfig {
    /// In-memory database for tests.
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(":memory:")
    }
}
