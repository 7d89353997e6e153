//! The streaming chat endpoint

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use loess_pipeline::{ChatTurn, EventSink, TurnError, TurnRequest};

use crate::auth::CurrentUser;
use crate::server::AppState;
use crate::Result;
use crate::WebError;

/// Buffered events between the turn task and the SSE writer. Small on
/// purpose: backpressure keeps the turn honest about disconnects.
const EVENT_CHANNEL_CAPACITY: usize = 32;

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/conversations/{conversation_id}/chat", post(chat))
}

fn default_stream() -> bool {
    true
}

fn default_top_k() -> u32 {
    8
}

fn default_max_hops() -> u32 {
    2
}

fn default_history() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    /// Accepted for wire compatibility; responses always stream.
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_top_k")]
    pub top_k_chunks: u32,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default = "default_history")]
    pub last_n_history: u32,
}

impl ChatRequest {
    fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(WebError::Validation("content must not be empty".into()));
        }
        if !(1..=30).contains(&self.top_k_chunks) {
            return Err(WebError::Validation("top_k_chunks must be in 1..=30".into()));
        }
        if !(1..=3).contains(&self.max_hops) {
            return Err(WebError::Validation("max_hops must be in 1..=3".into()));
        }
        if !(1..=100).contains(&self.last_n_history) {
            return Err(WebError::Validation(
                "last_n_history must be in 1..=100".into(),
            ));
        }
        Ok(())
    }
}

/// One chat turn: validation and the inbound write happen before the SSE
/// stream opens; the pipeline then runs as its own task feeding the event
/// channel. Dropping the response (client disconnect) closes the channel,
/// which the turn observes as cancellation and still finalizes.
async fn chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(conversation_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    req.validate()?;

    let request_id = Uuid::new_v4().to_string();
    let turn = ChatTurn::new(
        state.store.clone(),
        state.graph.clone(),
        state.model.clone(),
        TurnRequest {
            request_id: request_id.clone(),
            user_id: user.id,
            conversation_id,
            content: req.content,
            top_k_chunks: req.top_k_chunks as usize,
            max_hops: req.max_hops,
            last_n_history: req.last_n_history,
        },
    );

    let history = turn.prepare().await.map_err(|e| match e {
        TurnError::ConversationNotFound => WebError::NotFound("Conversation not found".into()),
        TurnError::Store(e) => WebError::Store(e),
    })?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let outcome = turn.run(history, EventSink::new(tx)).await;
        tracing::debug!(%request_id, ?outcome, "Chat turn finished");
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .event(event.event_type())
            .data(event.data().to_string()))
    });

    Ok(Sse::new(stream))
}
