//! Router assembly and server bootstrap

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use loess_config::ServerConfig;
use loess_core::{ChatModel, GraphStore};
use loess_store::SqliteStore;

use crate::routes::{chat_routes, conversation_routes, health_routes};
use crate::{Result, WebError};

/// Shared collaborators, built once by the composition root.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub graph: Arc<dyn GraphStore>,
    pub model: Arc<dyn ChatModel>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            "http://localhost:3000".parse().unwrap(),
            "http://localhost:5173".parse().unwrap(),
            "http://127.0.0.1:3000".parse().unwrap(),
            "http://127.0.0.1:5173".parse().unwrap(),
        ]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(conversation_routes())
        .merge(chat_routes())
        .with_state(state)
        .merge(health_routes())
        .layer(cors)
}

pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| WebError::Config(format!("invalid address: {e}")))?;

    tracing::info!("Starting loess server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(WebError::Io)?;
    axum::serve(listener, router(state))
        .await
        .map_err(WebError::Io)?;

    Ok(())
}
