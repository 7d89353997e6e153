//! The loess chat pipeline
//!
//! One request = one `ChatTurn`: validate and persist the inbound message,
//! extract entities, retrieve graph evidence, stream the grounded answer,
//! and finalize (persist the assistant turn, maybe auto-title) on every
//! exit path, including cancellation.

pub mod extractor;
pub mod title;
pub mod turn;

pub use extractor::{EntityExtractor, Extraction, EXTRACTION_SYSTEM_PROMPT};
pub use title::{clean_title, fallback_title, TitleGenerator, DEFAULT_TITLE};
pub use turn::{ChatTurn, EventSink, TurnError, TurnOutcome, TurnRequest, TurnStage};
