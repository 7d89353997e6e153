//! Graph store configuration

use serde::{Deserialize, Serialize};

fn default_path() -> String {
    "data/graph".to_string()
}

fn default_namespace() -> String {
    "loess".to_string()
}

fn default_database() -> String {
    "corpus".to_string()
}

/// Settings for the corpus graph database.
///
/// `path` selects the storage engine: an empty string or `:memory:` opens
/// an in-memory database, anything else a persistent one at that path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            namespace: default_namespace(),
            database: default_database(),
        }
    }
}

impl GraphConfig {
    /// In-memory configuration for tests and local experiments.
    pub fn memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.is_empty() || self.path == ":memory:"
    }
}
