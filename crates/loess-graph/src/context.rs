//! Deterministic rendering of evidence into the grounding block

use loess_core::Evidence;

use crate::retriever::MAX_EDGES;

/// Leading instruction for the grounding prompt.
pub const GROUNDING_INSTRUCTION: &str =
    "你将基于“子图事实”和“证据片段”回答用户问题。不得编造；若证据不足就说明不足。";

/// Render evidence into the context string fed to the generator.
///
/// Pure and deterministic: identical evidence yields a byte-identical
/// string. Empty sections render an explicit `(无)` marker so "no
/// evidence" never looks like "section dropped by a bug".
pub fn build_context(evidence: &Evidence) -> String {
    let fact_lines: Vec<String> = evidence
        .edges
        .iter()
        .take(MAX_EDGES)
        .filter(|e| !e.from.is_empty() && !e.to.is_empty())
        .map(|e| format!("- ({}) -[{}]-> ({})", e.from, e.relation.as_str(), e.to))
        .collect();

    let chunk_blocks: Vec<String> = evidence
        .chunks
        .iter()
        .map(|c| {
            format!(
                "[chunk_id={}, chapter_id={}] {}",
                c.chunk_id, c.chapter_id, c.text
            )
        })
        .collect();

    let facts = if fact_lines.is_empty() {
        "(无)\n".to_string()
    } else {
        fact_lines.join("\n")
    };
    let blocks = if chunk_blocks.is_empty() {
        "(无)\n".to_string()
    } else {
        chunk_blocks.join("\n\n")
    };

    format!("{GROUNDING_INSTRUCTION}\n\n子图事实：\n{facts}\n\n证据片段：\n{blocks}")
}
