//! Lenient JSON recovery from constrained LLM output

use once_cell::sync::Lazy;
use regex::Regex;

/// Outermost `{...}` span, for output that wraps the object in prose or
/// markdown fences.
static JSON_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Pull one JSON object out of model output.
///
/// Strict first: the whole (trimmed) text must parse. Lenient second: grab
/// the outermost brace span and parse that. `None` when neither works;
/// callers decide how to degrade.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let text = text.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if value.is_object() {
            return Some(value);
        }
    }

    let candidate = JSON_OBJECT_RE.find(text)?.as_str();
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}
