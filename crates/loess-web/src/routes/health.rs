//! Health check endpoint

use axum::routing::get;
use axum::{Json, Router};

pub fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
