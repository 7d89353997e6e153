//! SQLite persistence for loess
//!
//! Conversations, messages, users and API keys live in one SQLite
//! database behind a mutex-wrapped connection. `SqliteStore` implements
//! `loess_core::ConversationStore`; auth-key resolution is a concrete
//! extra used by the web layer.

pub mod connection;
pub mod schema;
pub mod store;

pub use connection::SqlitePool;
pub use store::{AuthUser, SqliteStore};
