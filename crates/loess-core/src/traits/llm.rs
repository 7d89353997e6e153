//! LLM provider abstraction: structured completion and token streaming

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::message::ChatMessage;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Per-call sampling overrides; provider defaults apply when unset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..Self::default()
        }
    }
}

/// A chat-capable model endpoint.
///
/// `complete` is the non-streaming call used for entity extraction and
/// title generation. `complete_stream` opens a fresh upstream connection
/// and yields token deltas strictly in generation order; the stream ends
/// normally on the provider's end-of-stream signal, and any transport
/// failure surfaces as an `Err` item so callers can tell "finished" from
/// "failed early". Streams are not restartable.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One non-streaming chat completion; returns the assistant content.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> LlmResult<String>;

    /// One streaming chat completion yielding token deltas.
    fn complete_stream(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> BoxStream<'static, LlmResult<String>>;

    fn model_name(&self) -> &str;
}
