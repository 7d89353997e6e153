//! Graph retrieval for loess
//!
//! The retriever turns an entity pack into a bounded evidence set with one
//! composite traversal per call; the context builder renders that evidence
//! into the grounding block fed to the generator. The SurrealDB client is
//! the production `GraphStore`.

pub mod context;
pub mod retriever;
pub mod surreal;

pub use context::build_context;
pub use retriever::{GraphRetriever, MAX_EDGES};
pub use surreal::GraphClient;
