//! Graph store abstraction: one composite traversal per retrieval call

use async_trait::async_trait;

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("graph connection error: {0}")]
    Connection(String),

    #[error("graph query error: {0}")]
    Query(String),
}

/// Normalized inputs for one composite traversal.
///
/// Lists arrive already truncated and normalized by the retriever;
/// `fallback_keywords` is the persons∪events substitution applied when
/// `keywords` is empty. `second_hop` is the clamped hop switch: the
/// traversal has exactly two expansion stages, so `max_hops > 2` behaves
/// as 2.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalParams {
    pub persons: Vec<String>,
    pub events: Vec<String>,
    pub keywords: Vec<String>,
    pub fallback_keywords: Vec<String>,
    pub second_hop: bool,
}

/// Raw edge row as returned by the store, before whitelist filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRow {
    pub from: String,
    pub relation: String,
    pub to: String,
}

/// Raw chunk row as returned by the store, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub chapter_id: String,
    pub text: String,
}

/// Uncapped traversal output: stage-1 then stage-2 hop edges, then
/// evidentiary chunks followed by keyword-fallback chunks, in store order.
#[derive(Debug, Clone, Default)]
pub struct TraversalRows {
    pub edges: Vec<EdgeRow>,
    pub chunks: Vec<ChunkRow>,
}

/// A query executor over the corpus graph.
///
/// Implementations issue exactly one composite query per `traverse` call,
/// borrowing a session for the call and never holding one across pipeline
/// stages. Errors propagate; a failed call never yields partial rows.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn traverse(&self, params: &TraversalParams) -> GraphResult<TraversalRows>;
}
