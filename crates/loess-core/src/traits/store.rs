//! Conversation persistence abstraction

use async_trait::async_trait;

use crate::types::message::{ChatMessage, Conversation, MessageRecord, Role};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage for conversations and their messages.
///
/// Ownership is enforced at this boundary: lookups take the owner id and
/// return `None` for conversations belonging to someone else.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<String>,
    ) -> StoreResult<Conversation>;

    /// Most recently updated first.
    async fn list_conversations(&self, user_id: &str, limit: u32)
        -> StoreResult<Vec<Conversation>>;

    async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> StoreResult<Option<Conversation>>;

    /// Appends a message and touches the conversation's `updated_at` in the
    /// same transaction.
    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        meta: serde_json::Value,
    ) -> StoreResult<MessageRecord>;

    /// Chronological, for display.
    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<MessageRecord>>;

    /// Last `limit` messages in chronological order, shaped for prompt
    /// inclusion. `limit` is clamped to 1..=100.
    async fn list_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<ChatMessage>>;

    async fn message_count(&self, conversation_id: &str) -> StoreResult<u64>;

    /// Owner-scoped title update; empty titles are ignored.
    async fn update_title(
        &self,
        user_id: &str,
        conversation_id: &str,
        title: &str,
    ) -> StoreResult<()>;
}
