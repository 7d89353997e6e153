//! DeepSeek chat provider (OpenAI-compatible wire format)

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;

use loess_config::LlmConfig;
use loess_core::{ChatMessage, ChatModel, CompletionOptions, LlmError, LlmResult};

/// Chat provider speaking the OpenAI `/chat/completions` dialect.
///
/// One instance serves all three call sites (answer streaming, entity
/// extraction, title generation); each call opens its own connection.
pub struct DeepSeekProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl DeepSeekProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            temperature,
            max_tokens,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Build from configuration; the API key is required.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                LlmError::Config("LLM API key not set (llm.api_key or LOESS_LLM_API_KEY)".into())
            })?;

        Ok(Self::new(
            api_key,
            config.base_url(),
            config.model(),
            config.temperature(),
            config.max_tokens(),
            config.timeout_secs(),
        ))
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(|m| {
                serde_json::json!({ "role": m.role.as_str(), "content": m.content })
            }).collect::<Vec<_>>(),
            "stream": stream,
            "temperature": options.temperature.unwrap_or(self.temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatModel for DeepSeekProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> LlmResult<String> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, options, false))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }

    fn complete_stream(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> BoxStream<'static, LlmResult<String>> {
        use async_stream::stream;
        use futures::StreamExt;

        let body = self.request_body(&messages, options, true);
        let url = self.completions_url();
        let api_key = self.api_key.clone();
        let client = self.client.clone();

        // No overall timeout on the streaming call; generations routinely
        // outlive the non-streaming budget.
        Box::pin(stream! {
            let response = client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(res) if res.status().is_success() => {
                    let mut byte_stream = res.bytes_stream();
                    let mut buffer = String::new();

                    while let Some(chunk) = byte_stream.next().await {
                        match chunk {
                            Ok(bytes) => {
                                buffer.push_str(&String::from_utf8_lossy(&bytes));

                                while let Some(line_end) = buffer.find('\n') {
                                    let line = buffer[..line_end].trim().to_string();
                                    buffer = buffer[line_end + 1..].to_string();

                                    let Some(data) = line.strip_prefix("data:") else {
                                        continue;
                                    };
                                    let data = data.trim();
                                    if data == "[DONE]" {
                                        return;
                                    }

                                    // Non-JSON keepalive lines are skipped.
                                    let Ok(chunk) =
                                        serde_json::from_str::<StreamChunk>(data)
                                    else {
                                        continue;
                                    };

                                    let delta = chunk
                                        .choices
                                        .into_iter()
                                        .next()
                                        .and_then(|c| c.delta.content);
                                    if let Some(token) = delta {
                                        if !token.is_empty() {
                                            yield Ok(token);
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                yield Err(LlmError::Http(e.to_string()));
                                return;
                            }
                        }
                    }
                }
                Ok(res) => {
                    let status = res.status().as_u16();
                    let message = res.text().await.unwrap_or_default();
                    yield Err(LlmError::Api { status, message });
                }
                Err(e) => {
                    yield Err(LlmError::Http(e.to_string()));
                }
            }
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
