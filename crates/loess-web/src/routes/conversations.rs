//! Conversation CRUD endpoints

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loess_core::{Conversation, ConversationStore};

use crate::auth::CurrentUser;
use crate::server::AppState;
use crate::Result;
use crate::WebError;

pub fn conversation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(list_messages),
        )
}

#[derive(Debug, Deserialize)]
struct CreateConversationRequest {
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConversationResponse {
    conversation_id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationResponse {
    fn from(c: Conversation) -> Self {
        Self {
            conversation_id: c.id,
            title: c.title,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<u32>,
}

async fn create_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<ConversationResponse>> {
    let conversation = state.store.create_conversation(&user.id, req.title).await?;
    Ok(Json(conversation.into()))
}

async fn list_conversations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ConversationResponse>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let conversations = state.store.list_conversations(&user.id, limit).await?;
    Ok(Json(conversations.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    id: String,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
    meta: serde_json::Value,
}

async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(conversation_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MessageResponse>>> {
    state
        .store
        .get_conversation(&user.id, &conversation_id)
        .await?
        .ok_or_else(|| WebError::NotFound("Conversation not found".into()))?;

    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let messages = state.store.list_messages(&conversation_id, limit).await?;
    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageResponse {
                id: m.id,
                role: m.role.as_str().to_string(),
                content: m.content,
                created_at: m.created_at,
                meta: m.meta,
            })
            .collect(),
    ))
}
