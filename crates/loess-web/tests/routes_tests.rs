//! Route-level tests driving the full router with mocked collaborators

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures::stream::BoxStream;
use http_body_util::BodyExt;
use tower::ServiceExt;

use loess_core::{
    ChatMessage, ChatModel, ChunkRow, CompletionOptions, ConversationStore, EdgeRow, GraphResult,
    GraphStore, LlmResult, TraversalParams, TraversalRows,
};
use loess_store::SqliteStore;
use loess_web::{router, AppState};

const EXTRACTION_JSON: &str =
    r#"{"persons":["孙少平"],"locations":[],"orgs":[],"events":[],"keywords":["关系"]}"#;

struct CannedModel;

#[async_trait]
impl ChatModel for CannedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: CompletionOptions,
    ) -> LlmResult<String> {
        // First call per turn is extraction, the second is the title.
        if messages
            .first()
            .is_some_and(|m| m.content.contains("信息抽取器"))
        {
            Ok(EXTRACTION_JSON.to_string())
        } else {
            Ok("少平的人际关系".to_string())
        }
    }

    fn complete_stream(
        &self,
        _messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> BoxStream<'static, LlmResult<String>> {
        Box::pin(futures::stream::iter(vec![
            Ok("孙少平与田晓霞".to_string()),
            Ok("关系最密切。".to_string()),
        ]))
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

struct CannedGraph;

#[async_trait]
impl GraphStore for CannedGraph {
    async fn traverse(&self, _params: &TraversalParams) -> GraphResult<TraversalRows> {
        Ok(TraversalRows {
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
        })
    }
}

struct TestApp {
    router: axum::Router,
    store: Arc<SqliteStore>,
    api_key: String,
    user_id: String,
}

fn app() -> TestApp {
    let store = Arc::new(SqliteStore::memory().unwrap());
    let user = store.ensure_user("reader@example.com").unwrap();
    let api_key = store.issue_api_key(&user.id).unwrap();

    let state = AppState {
        store: store.clone(),
        graph: Arc::new(CannedGraph),
        model: Arc::new(CannedModel),
    };

    TestApp {
        router: router(state),
        store,
        api_key,
        user_id: user.id,
    }
}

fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.api_key))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_needs_no_auth() {
    let app = app();
    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_bearer_key_is_rejected() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/conversations")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["detail"], "unauthorized");
}

#[tokio::test]
async fn conversations_round_trip() {
    let app = app();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            &app,
            "/conversations",
            serde_json::json!({ "title": "黄原岁月" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;
    assert_eq!(created["title"], "黄原岁月");

    let list = app
        .router
        .clone()
        .oneshot(
            Request::get("/conversations")
                .header(header::AUTHORIZATION, format!("Bearer {}", app.api_key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(list.status(), StatusCode::OK);
    let listed = json_body(list).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn chat_rejects_out_of_range_parameters() {
    let app = app();
    let conv = app
        .store
        .create_conversation(&app.user_id, None)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            &app,
            &format!("/conversations/{}/chat", conv.id),
            serde_json::json!({ "content": "问题", "top_k_chunks": 0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn chat_on_unknown_conversation_is_404_not_a_stream() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(post_json(
            &app,
            "/conversations/does-not-exist/chat",
            serde_json::json!({ "content": "问题" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["detail"], "Conversation not found");
}

#[tokio::test]
async fn chat_streams_the_full_event_protocol() {
    let app = app();
    let conv = app
        .store
        .create_conversation(&app.user_id, None)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            &app,
            &format!("/conversations/{}/chat", conv.id),
            serde_json::json!({ "content": "孙少平和谁关系最密切？" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.to_str().unwrap().starts_with("text/event-stream")));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(body.contains("event: meta"));
    assert!(body.contains("\"stage\":\"entity_extracted\""));
    assert!(body.contains("\"stage\":\"retrieved\""));
    assert!(body.contains("event: token"));
    assert!(body.contains("event: done"));
    assert!(body.contains("\"stage\":\"completed\""));

    // The assistant turn was persisted after the stream closed.
    let messages = app.store.list_messages(&conv.id, 50).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "孙少平与田晓霞关系最密切。");
}
