//! End-to-end tests for the chat turn state machine
//!
//! Scripted model + canned graph rows + a real in-memory SQLite store;
//! events are collected from the channel exactly as the SSE transport
//! would read them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use loess_core::{
    ChatMessage, ChatModel, ChunkRow, CompletionOptions, ConversationStore, EdgeRow, GraphError,
    GraphResult, GraphStore, LlmError, LlmResult, MetaPayload, Role, StreamEvent, TraversalParams,
    TraversalRows,
};
use loess_pipeline::{ChatTurn, EventSink, TurnError, TurnOutcome, TurnRequest};
use loess_store::SqliteStore;

const EXTRACTION_JSON: &str =
    r#"{"persons":["孙少平"],"locations":[],"orgs":[],"events":[],"keywords":["关系"]}"#;

/// Replays queued non-streaming completions and one scripted token stream.
struct ScriptedModel {
    completions: Mutex<VecDeque<LlmResult<String>>>,
    stream_items: Mutex<Vec<LlmResult<String>>>,
}

impl ScriptedModel {
    fn new(
        completions: Vec<LlmResult<String>>,
        stream_items: Vec<LlmResult<String>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            completions: Mutex::new(completions.into()),
            stream_items: Mutex::new(stream_items),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: CompletionOptions,
    ) -> LlmResult<String> {
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("{}".to_string()))
    }

    fn complete_stream(
        &self,
        _messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> BoxStream<'static, LlmResult<String>> {
        let items = self.stream_items.lock().unwrap().clone();
        Box::pin(futures::stream::iter(items))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct StaticGraph(GraphResult<TraversalRows>);

#[async_trait]
impl GraphStore for StaticGraph {
    async fn traverse(&self, _params: &TraversalParams) -> GraphResult<TraversalRows> {
        self.0.clone()
    }
}

fn sample_rows() -> TraversalRows {
    TraversalRows {
        edges: vec![EdgeRow {
            from: "孙少平".into(),
            relation: "LOVES".into(),
            to: "田晓霞".into(),
        }],
        chunks: vec![ChunkRow {
            chunk_id: "c1".into(),
            chapter_id: "ch12".into(),
            text: "孙少平与田晓霞在黄原重逢。".into(),
        }],
    }
}

struct Fixture {
    store: Arc<SqliteStore>,
    user_id: String,
    conversation_id: String,
}

async fn fixture() -> Fixture {
    let store = Arc::new(SqliteStore::memory().unwrap());
    let user = store.ensure_user("reader@example.com").unwrap();
    let conv = store.create_conversation(&user.id, None).await.unwrap();
    Fixture {
        store,
        user_id: user.id,
        conversation_id: conv.id,
    }
}

fn request(fx: &Fixture) -> TurnRequest {
    TurnRequest {
        request_id: "req-1".into(),
        user_id: fx.user_id.clone(),
        conversation_id: fx.conversation_id.clone(),
        content: "孙少平和谁关系最密切？".into(),
        top_k_chunks: 8,
        max_hops: 2,
        last_n_history: 20,
    }
}

fn turn(
    fx: &Fixture,
    graph: GraphResult<TraversalRows>,
    model: Arc<ScriptedModel>,
) -> ChatTurn {
    ChatTurn::new(
        fx.store.clone(),
        Arc::new(StaticGraph(graph)),
        model,
        request(fx),
    )
}

/// Run a prepared turn to completion, collecting every delivered event.
async fn run_collecting(turn: ChatTurn, history: Vec<ChatMessage>) -> (TurnOutcome, Vec<StreamEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let handle = tokio::spawn(turn.run(history, EventSink::new(tx)));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (handle.await.unwrap(), events)
}

#[tokio::test]
async fn completed_turn_streams_in_stage_order_and_persists() {
    let fx = fixture().await;
    let model = ScriptedModel::new(
        vec![Ok(EXTRACTION_JSON.into()), Ok("少平的人际关系".into())],
        vec![Ok("孙少平".into()), Ok("与田晓霞".into()), Ok("关系最密切。".into())],
    );
    let turn = turn(&fx, Ok(sample_rows()), model);

    let history = turn.prepare().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);

    let (outcome, events) = run_collecting(turn, history).await;
    assert_eq!(outcome, TurnOutcome::Completed);

    // Stage order: entity meta, retrieval meta, tokens, done.
    match &events[0] {
        StreamEvent::Meta {
            payload: MetaPayload::EntityExtracted { entities },
            ..
        } => assert_eq!(entities.persons, vec!["孙少平"]),
        other => panic!("expected entity meta first, got {other:?}"),
    }
    match &events[1] {
        StreamEvent::Meta {
            payload: MetaPayload::Retrieved { edges, chunks },
            ..
        } => {
            assert_eq!(*edges, 1);
            assert_eq!(chunks, &vec!["c1".to_string()]);
        }
        other => panic!("expected retrieval meta second, got {other:?}"),
    }
    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Token { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["孙少平", "与田晓霞", "关系最密切。"]);
    assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));

    // The assistant turn landed with its audit metadata.
    let messages = fx
        .store
        .list_messages(&fx.conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    let assistant = &messages[1];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.content, "孙少平与田晓霞关系最密切。");
    assert_eq!(assistant.meta["request_id"], "req-1");
    assert_eq!(assistant.meta["entities"]["persons"][0], "孙少平");
    assert_eq!(assistant.meta["retrieved"]["edges_count"], 1);
    assert_eq!(assistant.meta["retrieved"]["chunks"][0], "c1");

    // First completed turn on a placeholder title: auto-titled.
    let conv = fx
        .store
        .get_conversation(&fx.user_id, &fx.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.title, "少平的人际关系");
}

#[tokio::test]
async fn cancelled_turn_persists_partial_buffer_without_done() {
    let fx = fixture().await;
    let model = ScriptedModel::new(
        vec![Ok(EXTRACTION_JSON.into()), Ok("标题".into())],
        vec![Ok("Hello".into()), Ok(" wor".into()), Ok("ld".into())],
    );
    let turn = turn(&fx, Ok(sample_rows()), model);
    let history = turn.prepare().await.unwrap();

    // Capacity 1 gives the transport real backpressure: the turn cannot run
    // ahead of the client, so disconnecting mid-stream reliably cancels.
    let (tx, mut rx) = mpsc::channel(1);
    let handle = tokio::spawn(turn.run(history, EventSink::new(tx)));

    // Read up to the second token, then disconnect like a closed browser tab.
    let mut saw_done = false;
    let mut tokens_seen = 0;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Token { .. } => {
                tokens_seen += 1;
                if tokens_seen == 2 {
                    break;
                }
            }
            StreamEvent::Done { .. } => saw_done = true,
            _ => {}
        }
    }
    drop(rx);

    let outcome = handle.await.unwrap();
    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert!(!saw_done, "a cancelled stream must never deliver done");

    // The partial answer survived finalization.
    let messages = fx
        .store
        .list_messages(&fx.conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    let assistant = &messages[1];
    assert_eq!(assistant.role, Role::Assistant);
    assert!(assistant.content.starts_with("Hello wor"));
}

#[tokio::test]
async fn generation_failure_emits_error_and_keeps_partial_answer() {
    let fx = fixture().await;
    let model = ScriptedModel::new(
        vec![Ok(EXTRACTION_JSON.into()), Ok("标题".into())],
        vec![Ok("部分回答".into()), Err(LlmError::Http("connection reset".into()))],
    );
    let turn = turn(&fx, Ok(sample_rows()), model);
    let history = turn.prepare().await.unwrap();

    let (outcome, events) = run_collecting(turn, history).await;
    assert_eq!(outcome, TurnOutcome::Failed);

    assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Done { .. })));

    let messages = fx
        .store
        .list_messages(&fx.conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(messages[1].content, "部分回答");
}

#[tokio::test]
async fn retrieval_failure_aborts_with_no_assistant_message() {
    let fx = fixture().await;
    let model = ScriptedModel::new(vec![Ok(EXTRACTION_JSON.into())], vec![Ok("unreached".into())]);
    let turn = turn(
        &fx,
        Err(GraphError::Connection("store unreachable".into())),
        model,
    );
    let history = turn.prepare().await.unwrap();

    let (outcome, events) = run_collecting(turn, history).await;
    assert_eq!(outcome, TurnOutcome::Failed);

    // Entity meta, then the error; generation never started.
    assert!(matches!(
        events[0],
        StreamEvent::Meta {
            payload: MetaPayload::EntityExtracted { .. },
            ..
        }
    ));
    assert!(matches!(events[1], StreamEvent::Error { .. }));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Token { .. })));

    // Only the inbound user message persisted.
    let messages = fx
        .store
        .list_messages(&fx.conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn second_turn_never_retitles() {
    let fx = fixture().await;

    // A prior user+assistant pair whose title generation was skipped,
    // leaving the placeholder in place.
    fx.store
        .add_message(&fx.conversation_id, Role::User, "旧问题", serde_json::json!({}))
        .await
        .unwrap();
    fx.store
        .add_message(
            &fx.conversation_id,
            Role::Assistant,
            "旧回答",
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let model = ScriptedModel::new(
        vec![Ok(EXTRACTION_JSON.into()), Ok("不应出现的标题".into())],
        vec![Ok("新回答".into())],
    );
    let turn = turn(&fx, Ok(sample_rows()), model);
    let history = turn.prepare().await.unwrap();

    let (outcome, _) = run_collecting(turn, history).await;
    assert_eq!(outcome, TurnOutcome::Completed);

    // Count after this turn's writes is 4 > 2, so the guard holds.
    let conv = fx
        .store
        .get_conversation(&fx.user_id, &fx.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.title, "New chat");
}

#[tokio::test]
async fn title_failure_falls_back_to_question_prefix() {
    let fx = fixture().await;
    let model = ScriptedModel::new(
        vec![
            Ok(EXTRACTION_JSON.into()),
            Err(LlmError::Http("title call failed".into())),
        ],
        vec![Ok("回答。".into())],
    );
    let turn = turn(&fx, Ok(sample_rows()), model);
    let history = turn.prepare().await.unwrap();

    let (outcome, _) = run_collecting(turn, history).await;
    assert_eq!(outcome, TurnOutcome::Completed);

    let conv = fx
        .store
        .get_conversation(&fx.user_id, &fx.conversation_id)
        .await
        .unwrap()
        .unwrap();
    // The question is short, so the fallback is the question itself.
    assert_eq!(conv.title, "孙少平和谁关系最密切？");
}

#[tokio::test]
async fn empty_generation_persists_nothing() {
    let fx = fixture().await;
    let model = ScriptedModel::new(vec![Ok(EXTRACTION_JSON.into())], vec![]);
    let turn = turn(&fx, Ok(sample_rows()), model);
    let history = turn.prepare().await.unwrap();

    let (outcome, events) = run_collecting(turn, history).await;
    assert_eq!(outcome, TurnOutcome::Completed);
    assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));

    let messages = fx
        .store
        .list_messages(&fx.conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1, "no assistant message for an empty answer");
}

#[tokio::test]
async fn unknown_conversation_fails_validation_before_any_stream() {
    let fx = fixture().await;
    let model = ScriptedModel::new(vec![], vec![]);
    let mut req = request(&fx);
    req.conversation_id = "missing".into();
    let turn = ChatTurn::new(
        fx.store.clone(),
        Arc::new(StaticGraph(Ok(TraversalRows::default()))),
        model,
        req,
    );

    assert!(matches!(
        turn.prepare().await,
        Err(TurnError::ConversationNotFound)
    ));
}
