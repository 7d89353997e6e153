//! HTTP layer for loess
//!
//! Bearer-key auth, conversation CRUD, and the SSE chat endpoint that
//! bridges the turn orchestrator's event channel onto the wire.

pub mod auth;
pub mod routes;
pub mod server;

mod error;

pub use auth::CurrentUser;
pub use error::{Result, WebError};
pub use server::{router, serve, AppState};
