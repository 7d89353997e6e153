//! LLM provider configuration (DeepSeek / OpenAI-compatible)

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_MAX_TOKENS: u32 = 1400;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Settings for the chat/extraction model endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL.
    pub base_url: Option<String>,
    /// API key; usually supplied via `LOESS_LLM_API_KEY` instead.
    pub api_key: Option<String>,
    /// Model id for all calls (answers, extraction, titles).
    pub model: Option<String>,
    /// Default sampling temperature for non-streaming calls.
    pub temperature: Option<f32>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Total timeout for non-streaming calls; streaming calls run unbounded.
    pub timeout_secs: Option<u64>,
}

impl LlmConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}
