//! The chat turn state machine
//!
//! One request moves through `Validating → Extracting → Retrieving →
//! Generating → Finalizing` and ends `Completed`, `Failed` or `Cancelled`.
//! Validation (ownership check, inbound persistence, history load) runs
//! before any streaming output; Finalizing runs on every exit path with
//! whatever partial answer accumulated, so a cancelled stream still leaves
//! an auditable record.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use loess_core::{
    ChatMessage, ChatModel, CompletionOptions, ConversationStore, EntityPack, Evidence,
    GraphStore, MetaPayload, Role, StoreError, StreamEvent,
};
use loess_graph::{build_context, GraphRetriever};

use crate::extractor::EntityExtractor;
use crate::title::{clean_title, TitleGenerator, DEFAULT_TITLE};

/// Closing instruction enforcing the citation contract.
pub const CITATION_INSTRUCTION: &str =
    "回答要求：不得编造；若证据不足请说明；末尾输出：Citations: [chunk_id,...]（必须来自检索到的 chunks，去重后输出）";

const ANSWER_TEMPERATURE: f32 = 0.2;

/// Pipeline stages, in order. `Finalizing` is entered from every other
/// terminal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Validating,
    Extracting,
    Retrieving,
    Generating,
    Finalizing,
}

/// How the turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Errors surfaced before the stream opens; everything later is reported
/// through the event stream instead.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("conversation not found")]
    ConversationNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One validated inbound chat request.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub request_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub content: String,
    pub top_k_chunks: usize,
    pub max_hops: u32,
    pub last_n_history: u32,
}

/// Transport handle the turn emits events through.
///
/// A failed emit means the receiver is gone (client disconnect); the turn
/// treats that as the cancellation signal and unwinds into Finalizing.
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

/// The receiving side dropped; the client is no longer listening.
#[derive(Debug)]
pub struct SinkClosed;

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: StreamEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }
}

/// One chat request as a cancellable unit of work.
pub struct ChatTurn {
    store: Arc<dyn ConversationStore>,
    retriever: GraphRetriever,
    extractor: EntityExtractor,
    titles: TitleGenerator,
    model: Arc<dyn ChatModel>,
    request: TurnRequest,
}

impl ChatTurn {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        graph: Arc<dyn GraphStore>,
        model: Arc<dyn ChatModel>,
        request: TurnRequest,
    ) -> Self {
        Self {
            store,
            retriever: GraphRetriever::new(graph),
            extractor: EntityExtractor::new(model.clone()),
            titles: TitleGenerator::new(model.clone()),
            model,
            request,
        }
    }

    /// `Validating`: confirm ownership, persist the inbound user message,
    /// load prompt history. Runs to completion before any stream opens so
    /// a failure here never leaves a half-opened stream.
    pub async fn prepare(&self) -> Result<Vec<ChatMessage>, TurnError> {
        let req = &self.request;
        tracing::debug!(request_id = %req.request_id, stage = ?TurnStage::Validating, "Chat turn starting");

        self.store
            .get_conversation(&req.user_id, &req.conversation_id)
            .await?
            .ok_or(TurnError::ConversationNotFound)?;

        self.store
            .add_message(
                &req.conversation_id,
                Role::User,
                &req.content,
                serde_json::json!({ "request_id": req.request_id }),
            )
            .await?;

        let history = self
            .store
            .list_recent_messages(&req.conversation_id, req.last_n_history)
            .await?;

        Ok(history)
    }

    /// Drive `Extracting → Retrieving → Generating`, then always run
    /// `Finalizing` with whatever accumulated.
    pub async fn run(self, history: Vec<ChatMessage>, sink: EventSink) -> TurnOutcome {
        let mut entities = EntityPack::default();
        let mut evidence = Evidence::default();
        let mut buffer = String::new();

        let outcome = self
            .drive(history, &sink, &mut entities, &mut evidence, &mut buffer)
            .await;

        if outcome == TurnOutcome::Cancelled {
            tracing::info!(request_id = %self.request.request_id, "Client cancelled mid-stream");
            // Best effort; the disconnected client usually never sees it.
            let _ = sink
                .emit(StreamEvent::Error {
                    id: self.request.request_id.clone(),
                    message: "client cancelled".to_string(),
                })
                .await;
        }

        self.finalize(&entities, &evidence, &buffer).await;
        outcome
    }

    async fn drive(
        &self,
        history: Vec<ChatMessage>,
        sink: &EventSink,
        entities: &mut EntityPack,
        evidence: &mut Evidence,
        buffer: &mut String,
    ) -> TurnOutcome {
        let req = &self.request;

        tracing::debug!(request_id = %req.request_id, stage = ?TurnStage::Extracting, "Extracting entities");
        *entities = self.extractor.extract(&req.content).await.into_pack();
        if sink
            .emit(StreamEvent::Meta {
                id: req.request_id.clone(),
                payload: MetaPayload::EntityExtracted {
                    entities: entities.clone(),
                },
            })
            .await
            .is_err()
        {
            return TurnOutcome::Cancelled;
        }

        tracing::debug!(request_id = %req.request_id, stage = ?TurnStage::Retrieving, "Retrieving evidence");
        match self
            .retriever
            .retrieve(entities, req.top_k_chunks, req.max_hops)
            .await
        {
            Ok(found) => *evidence = found,
            Err(e) => {
                tracing::error!(request_id = %req.request_id, error = %e, "Graph retrieval failed");
                let _ = sink
                    .emit(StreamEvent::Error {
                        id: req.request_id.clone(),
                        message: e.to_string(),
                    })
                    .await;
                return TurnOutcome::Failed;
            }
        }
        if sink
            .emit(StreamEvent::Meta {
                id: req.request_id.clone(),
                payload: MetaPayload::Retrieved {
                    edges: evidence.edges.len(),
                    chunks: evidence.chunk_ids(),
                },
            })
            .await
            .is_err()
        {
            return TurnOutcome::Cancelled;
        }

        tracing::debug!(request_id = %req.request_id, stage = ?TurnStage::Generating, "Streaming answer");
        let mut messages = vec![
            ChatMessage::system(CITATION_INSTRUCTION),
            ChatMessage::system(build_context(evidence)),
        ];
        messages.extend(history);

        let mut stream = self.model.complete_stream(
            messages,
            CompletionOptions::with_temperature(ANSWER_TEMPERATURE),
        );

        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    buffer.push_str(&delta);
                    if sink
                        .emit(StreamEvent::Token {
                            id: req.request_id.clone(),
                            delta,
                        })
                        .await
                        .is_err()
                    {
                        return TurnOutcome::Cancelled;
                    }
                }
                Err(e) => {
                    tracing::error!(request_id = %req.request_id, error = %e, "Generation failed mid-stream");
                    let _ = sink
                        .emit(StreamEvent::Error {
                            id: req.request_id.clone(),
                            message: e.to_string(),
                        })
                        .await;
                    return TurnOutcome::Failed;
                }
            }
        }

        if sink
            .emit(StreamEvent::Done {
                id: req.request_id.clone(),
            })
            .await
            .is_err()
        {
            return TurnOutcome::Cancelled;
        }
        TurnOutcome::Completed
    }

    /// `Finalizing`: persist the assistant turn when anything accumulated,
    /// then maybe auto-title. Persistence failures are fatal to this
    /// request only; they are logged, never thrown.
    async fn finalize(&self, entities: &EntityPack, evidence: &Evidence, buffer: &str) {
        let req = &self.request;
        tracing::debug!(request_id = %req.request_id, stage = ?TurnStage::Finalizing, "Finalizing turn");

        let answer = buffer.trim();
        if answer.is_empty() {
            return;
        }

        let conversation = match self
            .store
            .get_conversation(&req.user_id, &req.conversation_id)
            .await
        {
            Ok(Some(c)) => c,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(request_id = %req.request_id, error = %e, "Finalize lookup failed");
                return;
            }
        };

        let meta = serde_json::json!({
            "request_id": req.request_id,
            "entities": entities,
            "retrieved": {
                "edges_count": evidence.edges.len(),
                "chunks": evidence.chunk_ids(),
            },
        });

        if let Err(e) = self
            .store
            .add_message(&req.conversation_id, Role::Assistant, answer, meta)
            .await
        {
            tracing::error!(request_id = %req.request_id, error = %e, "Failed to persist assistant message");
            return;
        }

        // Auto-title only the very first completed turn of a conversation
        // still carrying the placeholder title.
        if conversation.title.trim() != DEFAULT_TITLE {
            return;
        }
        match self.store.message_count(&req.conversation_id).await {
            Ok(n) if n <= 2 => {
                let title = self.titles.generate(&req.content, answer).await;
                let title = clean_title(&title);
                if !title.is_empty() && title != DEFAULT_TITLE {
                    if let Err(e) = self
                        .store
                        .update_title(&req.user_id, &req.conversation_id, &title)
                        .await
                    {
                        tracing::error!(request_id = %req.request_id, error = %e, "Title update failed");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(request_id = %req.request_id, error = %e, "Message count lookup failed");
            }
        }
    }
}
