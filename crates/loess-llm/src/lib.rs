//! DeepSeek chat provider for loess
//!
//! Implements `loess_core::ChatModel` over the OpenAI-compatible
//! `/chat/completions` endpoint: non-streaming completions for entity
//! extraction and title generation, and SSE streaming for answer
//! generation.

pub mod json;
pub mod provider;

pub use json::extract_json_object;
pub use provider::DeepSeekProvider;
