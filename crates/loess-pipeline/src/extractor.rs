//! Entity extraction from a free-text question

use std::sync::Arc;

use loess_core::{ChatMessage, ChatModel, CompletionOptions, EntityPack};
use loess_llm::extract_json_object;

/// Instruction demanding strict JSON with exactly the five pack fields.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "你是信息抽取器。给定小说问句，抽取可能的实体与关键词。\
只输出严格 JSON，不要输出多余文字。字段：persons, locations, orgs, events, keywords，值为字符串数组。";

/// Outcome of one extraction attempt.
///
/// `Degraded` carries the raw question as the only keyword so retrieval
/// still has a search term; extraction never propagates a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Parsed(EntityPack),
    Degraded(EntityPack),
}

impl Extraction {
    pub fn pack(&self) -> &EntityPack {
        match self {
            Extraction::Parsed(pack) | Extraction::Degraded(pack) => pack,
        }
    }

    pub fn into_pack(self) -> EntityPack {
        match self {
            Extraction::Parsed(pack) | Extraction::Degraded(pack) => pack,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Extraction::Degraded(_))
    }
}

/// Turns a question into a typed entity pack via one constrained LLM call.
pub struct EntityExtractor {
    model: Arc<dyn ChatModel>,
}

impl EntityExtractor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn extract(&self, question: &str) -> Extraction {
        let messages = [
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(question),
        ];

        match self
            .model
            .complete(&messages, CompletionOptions::with_temperature(0.0))
            .await
        {
            Ok(content) => match decode_pack(&content) {
                Some(pack) => Extraction::Parsed(pack),
                None => {
                    tracing::warn!(
                        head = %content.chars().take(80).collect::<String>(),
                        "Extraction output was not a usable entity pack, degrading to keyword retrieval"
                    );
                    Extraction::Degraded(EntityPack::from_raw_question(question))
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Extraction call failed, degrading to keyword retrieval");
                Extraction::Degraded(EntityPack::from_raw_question(question))
            }
        }
    }
}

/// Strict-then-lenient decode; missing fields default to empty containers.
fn decode_pack(content: &str) -> Option<EntityPack> {
    let value = extract_json_object(content)?;
    serde_json::from_value(value).ok()
}
