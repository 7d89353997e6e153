//! Collaborator abstractions the pipeline orchestrates through
//!
//! Core defines the traits; the backend crates (loess-llm, loess-graph,
//! loess-store) provide the implementations, wired together by the
//! composition root in the binary.

pub mod graph;
pub mod llm;
pub mod store;
