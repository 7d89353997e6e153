//! Core types and collaborator abstractions for loess
//!
//! Following the dependency-inversion layout, this crate defines the domain
//! types (entity packs, evidence, stream events, chat records) and the traits
//! the pipeline orchestrates through (`ChatModel`, `GraphStore`,
//! `ConversationStore`). Implementations live in the backend crates and are
//! injected by the composition root.

pub mod traits;
pub mod types;

pub use traits::graph::{
    ChunkRow, EdgeRow, GraphError, GraphResult, GraphStore, TraversalParams, TraversalRows,
};
pub use traits::llm::{ChatModel, CompletionOptions, LlmError, LlmResult};
pub use traits::store::{ConversationStore, StoreError, StoreResult};
pub use types::entity::EntityPack;
pub use types::event::{MetaPayload, StreamEvent};
pub use types::evidence::{Chunk, Edge, Evidence, RelationType};
pub use types::message::{ChatMessage, Conversation, MessageRecord, Role};
