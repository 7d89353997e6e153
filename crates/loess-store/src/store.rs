//! Conversation, message and API-key storage

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use loess_core::{
    ChatMessage, Conversation, ConversationStore, MessageRecord, Role, StoreError, StoreResult,
};

use crate::connection::{db_err, SqlitePool};

pub const DEFAULT_TITLE: &str = "New chat";

/// Authenticated principal resolved from an API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// SQLite-backed store for users, API keys, conversations and messages.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Fixed-width RFC 3339 so text ordering stays chronological.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {raw:?}: {e}")))
}

fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// In-memory store for tests.
    pub fn memory() -> StoreResult<Self> {
        Ok(Self::new(SqlitePool::memory()?))
    }

    fn map_conversation(
        (id, user_id, title, created_at, updated_at): (String, String, String, String, String),
    ) -> StoreResult<Conversation> {
        Ok(Conversation {
            id,
            user_id,
            title,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
        })
    }

    fn map_message(
        (id, conversation_id, role, content, created_at, meta_json): (
            String,
            String,
            String,
            String,
            String,
            String,
        ),
    ) -> StoreResult<MessageRecord> {
        let role = Role::parse(&role)
            .ok_or_else(|| StoreError::Serialization(format!("unknown role {role:?}")))?;
        let meta = serde_json::from_str(&meta_json)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(MessageRecord {
            id,
            conversation_id,
            role,
            content,
            created_at: parse_ts(&created_at)?,
            meta,
        })
    }

    /// Find a user by email, creating it on first use.
    pub fn ensure_user(&self, email: &str) -> StoreResult<AuthUser> {
        self.pool.with_connection(|conn| {
            let existing: Option<(String, String)> = conn
                .query_row(
                    "SELECT id, email FROM users WHERE email = ?1",
                    params![email],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db_err)?;

            if let Some((id, email)) = existing {
                return Ok(AuthUser { id, email });
            }

            let id = new_id();
            conn.execute(
                "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
                params![id, email, now()],
            )
            .map_err(db_err)?;
            Ok(AuthUser {
                id,
                email: email.to_string(),
            })
        })
    }

    /// Mint a bearer key for the user; only its hash is stored.
    pub fn issue_api_key(&self, user_id: &str) -> StoreResult<String> {
        use rand::RngExt;

        let raw: [u8; 32] = rand::rng().random();
        let key = format!("loess_{}", hex::encode(raw));

        self.pool.with_connection(|conn| {
            conn.execute(
                "INSERT INTO api_keys (id, user_id, key_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![new_id(), user_id, hash_key(&key), now()],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        Ok(key)
    }

    /// Resolve a bearer key to its user; `None` for unknown keys.
    pub fn resolve_api_key(&self, key: &str) -> StoreResult<Option<AuthUser>> {
        let hash = hash_key(key);
        self.pool.with_connection(|conn| {
            conn.query_row(
                "SELECT u.id, u.email FROM api_keys k JOIN users u ON u.id = k.user_id \
                 WHERE k.key_hash = ?1",
                params![hash],
                |row| {
                    Ok(AuthUser {
                        id: row.get(0)?,
                        email: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
        })
    }

    fn insert_message(
        conn: &Connection,
        conversation_id: &str,
        role: Role,
        content: &str,
        meta: &serde_json::Value,
    ) -> StoreResult<MessageRecord> {
        let id = new_id();
        let created_at = now();
        let meta_json =
            serde_json::to_string(meta).map_err(|e| StoreError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at, meta_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, conversation_id, role.as_str(), content, created_at, meta_json],
        )
        .map_err(db_err)?;

        Ok(MessageRecord {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: parse_ts(&created_at)?,
            meta: meta.clone(),
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<String>,
    ) -> StoreResult<Conversation> {
        let id = new_id();
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let ts = now();

        self.pool.with_connection(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, user_id, title, ts, ts],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        Ok(Conversation {
            id,
            user_id: user_id.to_string(),
            title,
            created_at: parse_ts(&ts)?,
            updated_at: parse_ts(&ts)?,
        })
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<Conversation>> {
        self.pool.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, title, created_at, updated_at FROM conversations \
                     WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![user_id, limit], conversation_from_row)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            rows.into_iter().map(Self::map_conversation).collect()
        })
    }

    async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> StoreResult<Option<Conversation>> {
        self.pool.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, title, created_at, updated_at FROM conversations \
                     WHERE id = ?1 AND user_id = ?2",
                    params![conversation_id, user_id],
                    conversation_from_row,
                )
                .optional()
                .map_err(db_err)?;
            row.map(Self::map_conversation).transpose()
        })
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        meta: serde_json::Value,
    ) -> StoreResult<MessageRecord> {
        self.pool.with_connection_mut(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            let record = Self::insert_message(&tx, conversation_id, role, content, &meta)?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now(), conversation_id],
            )
            .map_err(db_err)?;
            tx.commit().map_err(db_err)?;
            Ok(record)
        })
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<MessageRecord>> {
        self.pool.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, role, content, created_at, meta_json \
                     FROM messages WHERE conversation_id = ?1 \
                     ORDER BY created_at ASC LIMIT ?2",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![conversation_id, limit], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            rows.into_iter().map(Self::map_message).collect()
        })
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<ChatMessage>> {
        let limit = limit.clamp(1, 100);
        self.pool.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT role, content FROM messages WHERE conversation_id = ?1 \
                     ORDER BY created_at DESC LIMIT ?2",
                )
                .map_err(db_err)?;
            let mut rows: Vec<(String, String)> = stmt
                .query_map(params![conversation_id, limit], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            rows.reverse();

            rows.into_iter()
                .map(|(role, content)| {
                    let role = Role::parse(&role).ok_or_else(|| {
                        StoreError::Serialization(format!("unknown role {role:?}"))
                    })?;
                    Ok(ChatMessage { role, content })
                })
                .collect()
        })
    }

    async fn message_count(&self, conversation_id: &str) -> StoreResult<u64> {
        self.pool.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get::<_, i64>(0).map(|n| n as u64),
            )
            .map_err(db_err)
        })
    }

    async fn update_title(
        &self,
        user_id: &str,
        conversation_id: &str,
        title: &str,
    ) -> StoreResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(());
        }
        self.pool.with_connection(|conn| {
            conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND user_id = ?4",
                params![title, now(), conversation_id, user_id],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }
}
