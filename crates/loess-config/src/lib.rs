//! Configuration for the loess service
//!
//! A single `Config` root with component sections, loaded from an optional
//! `loess.toml` and finished with environment overrides for secrets. Every
//! field has a serde default so a missing file or empty section still
//! yields a runnable configuration.

pub mod components;

use std::path::Path;

pub use components::graph::GraphConfig;
pub use components::llm::LlmConfig;
pub use components::server::ServerConfig;
pub use components::storage::StorageConfig;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides.
    ///
    /// A missing path yields the defaults; `LOESS_LLM_API_KEY` always wins
    /// over the file so the key can stay out of checked-in config.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                let parsed: Config = toml::from_str(&raw)?;
                tracing::debug!(path = %p.display(), "Loaded configuration file");
                parsed
            }
            Some(p) => {
                tracing::warn!(path = %p.display(), "Config file not found, using defaults");
                Config::default()
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("LOESS_LLM_API_KEY") {
            if !key.is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("LOESS_LLM_BASE_URL") {
            if !url.is_empty() {
                self.llm.base_url = Some(url);
            }
        }
        if let Ok(path) = std::env::var("LOESS_GRAPH_PATH") {
            if !path.is_empty() {
                self.graph.path = path;
            }
        }
    }
}
