//! Server-push events for the streaming chat protocol

use serde::{Deserialize, Serialize};

use super::entity::EntityPack;

/// Per-stage metadata pushed before the next pipeline stage starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum MetaPayload {
    EntityExtracted { entities: EntityPack },
    Retrieved { edges: usize, chunks: Vec<String> },
}

/// Wire-level unit pushed to the client over the event stream.
///
/// Created by the orchestrator per pipeline stage, consumed immediately by
/// the transport, never persisted. A stream terminates with exactly one of
/// `Done` or `Error`, or ends abruptly on cancellation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Meta { id: String, payload: MetaPayload },
    Token { id: String, delta: String },
    Done { id: String },
    Error { id: String, message: String },
}

impl StreamEvent {
    /// SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Meta { .. } => "meta",
            StreamEvent::Token { .. } => "token",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// JSON payload for the `data:` line.
    pub fn data(&self) -> serde_json::Value {
        match self {
            StreamEvent::Meta { id, payload } => {
                let mut data = serde_json::to_value(payload).unwrap_or_default();
                if let Some(obj) = data.as_object_mut() {
                    obj.insert("id".into(), serde_json::Value::String(id.clone()));
                }
                data
            }
            StreamEvent::Token { id, delta } => {
                serde_json::json!({ "id": id, "delta": delta })
            }
            StreamEvent::Done { id } => {
                serde_json::json!({ "id": id, "stage": "completed" })
            }
            StreamEvent::Error { id, message } => {
                serde_json::json!({ "id": id, "message": message })
            }
        }
    }

    /// Encode as one `event: <type>\ndata: <json>\n\n` frame.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_type(), self.data())
    }
}
