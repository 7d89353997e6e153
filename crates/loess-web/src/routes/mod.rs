//! Route modules

pub mod chat;
pub mod conversations;
pub mod health;

pub use chat::chat_routes;
pub use conversations::conversation_routes;
pub use health::health_routes;
