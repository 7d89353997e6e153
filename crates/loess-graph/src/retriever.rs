//! Bounded multi-hop retrieval with keyword fallback

use std::collections::HashSet;
use std::sync::Arc;

use loess_core::{
    Chunk, Edge, EntityPack, Evidence, GraphResult, GraphStore, RelationType, TraversalParams,
};

/// Hard cap on relation facts carried into the prompt.
pub const MAX_EDGES: usize = 80;

const MAX_PERSONS: usize = 5;
const MAX_EVENTS: usize = 5;
const MAX_KEYWORDS: usize = 8;

/// Trim, drop empties, dedupe preserving first occurrence.
fn normalize_terms<'a>(terms: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for term in terms {
        let term = term.trim();
        if term.is_empty() || !seen.insert(term) {
            continue;
        }
        out.push(term.to_string());
    }
    out
}

/// Turns an entity pack into evidence via one composite store traversal.
pub struct GraphRetriever {
    store: Arc<dyn GraphStore>,
}

impl GraphRetriever {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Retrieve up to `top_k` chunks and up to [`MAX_EDGES`] whitelisted
    /// relation edges for the given pack.
    ///
    /// `max_hops` is clamped to the traversal's two expansion stages.
    /// Store failures propagate; there is no silent empty result.
    pub async fn retrieve(
        &self,
        pack: &EntityPack,
        top_k: usize,
        max_hops: u32,
    ) -> GraphResult<Evidence> {
        let persons: Vec<&str> = pack.persons.iter().take(MAX_PERSONS).map(String::as_str).collect();
        let events: Vec<&str> = pack.events.iter().take(MAX_EVENTS).map(String::as_str).collect();

        // When the extractor omitted keywords the substring fallback runs on
        // persons∪events instead, so retrieval never goes empty-handed just
        // because structured extraction was terse.
        let fallback_keywords =
            normalize_terms(persons.iter().chain(events.iter()).copied());

        let params = TraversalParams {
            persons: normalize_terms(persons),
            events: normalize_terms(events),
            keywords: normalize_terms(pack.keywords.iter().take(MAX_KEYWORDS).map(String::as_str)),
            fallback_keywords,
            second_hop: max_hops >= 2,
        };

        let rows = self.store.traverse(&params).await?;

        let mut seen_edges: HashSet<Edge> = HashSet::new();
        let mut edges = Vec::new();
        for row in rows.edges {
            // Empty relations are artifacts of outer-join traversal where no
            // hop existed; anything off the whitelist is excluded outright.
            let Some(relation) = RelationType::parse(&row.relation) else {
                continue;
            };
            let edge = Edge {
                from: row.from,
                relation,
                to: row.to,
            };
            if seen_edges.insert(edge.clone()) {
                edges.push(edge);
                if edges.len() >= MAX_EDGES {
                    break;
                }
            }
        }

        let mut seen_chunks: HashSet<String> = HashSet::new();
        let mut chunks = Vec::new();
        for row in rows.chunks {
            if row.chunk_id.is_empty() || !seen_chunks.insert(row.chunk_id.clone()) {
                continue;
            }
            chunks.push(Chunk {
                chunk_id: row.chunk_id,
                chapter_id: row.chapter_id,
                text: row.text,
            });
            if chunks.len() >= top_k {
                break;
            }
        }

        tracing::debug!(
            edges = edges.len(),
            chunks = chunks.len(),
            "Graph retrieval finished"
        );

        Ok(Evidence { edges, chunks })
    }
}
