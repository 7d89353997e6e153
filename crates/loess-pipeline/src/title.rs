//! Conversation title generation with deterministic fallback

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use loess_core::{ChatMessage, ChatModel, CompletionOptions};

/// Placeholder title new conversations start with.
pub const DEFAULT_TITLE: &str = "New chat";

pub const TITLE_SYSTEM_PROMPT: &str = "你是对话标题生成器。根据“用户问题”和“助手回答”，生成一个简短会话标题。\n\
要求：\n\
1) 中文为主，5-20字；或英文不超过8个单词\n\
2) 不要引号，不要换行，不要前缀（如：标题：）\n\
3) 只输出标题文本";

/// Trailing CJK/ASCII punctuation and quote runs.
static TRAILING_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[。！？!?,，:：；;“”\"'()\\[\\]{}]+$").unwrap());

const MAX_TITLE_CHARS: usize = 30;
const FALLBACK_PREFIX_CHARS: usize = 18;
const ANSWER_DIGEST_CHARS: usize = 400;

/// Normalize raw model output into a usable one-line title.
pub fn clean_title(raw: &str) -> String {
    let s = raw.trim();
    let s = s.trim_matches('"').trim_matches('\'').trim();
    let s = s.lines().next().unwrap_or("").trim();
    let s = TRAILING_PUNCT_RE.replace(s, "");
    let s = s.trim();

    if s.chars().count() > MAX_TITLE_CHARS {
        s.chars().take(MAX_TITLE_CHARS).collect::<String>().trim().to_string()
    } else {
        s.to_string()
    }
}

/// Deterministic title when generation is unavailable: a prefix of the
/// question, or the placeholder for a blank question.
pub fn fallback_title(question: &str) -> String {
    let q = question.trim();
    if q.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if q.chars().count() > FALLBACK_PREFIX_CHARS {
        format!("{}…", q.chars().take(FALLBACK_PREFIX_CHARS).collect::<String>())
    } else {
        q.to_string()
    }
}

/// Secondary LLM call producing a short conversation title.
///
/// Never fails: any provider error or empty output falls back to
/// [`fallback_title`].
pub struct TitleGenerator {
    model: Arc<dyn ChatModel>,
}

impl TitleGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn generate(&self, question: &str, answer: &str) -> String {
        let q = question.trim();
        let a = answer.trim();
        let fallback = fallback_title(q);

        let digest: String = a.chars().take(ANSWER_DIGEST_CHARS).collect();
        let messages = [
            ChatMessage::system(TITLE_SYSTEM_PROMPT),
            ChatMessage::user(format!("用户问题：{q}\n\n助手回答（摘要）：{digest}")),
        ];

        match self
            .model
            .complete(&messages, CompletionOptions::with_temperature(0.2))
            .await
        {
            Ok(raw) => {
                let title = clean_title(&raw);
                if title.is_empty() {
                    fallback
                } else {
                    title
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Title generation failed, using question prefix");
                fallback
            }
        }
    }
}
