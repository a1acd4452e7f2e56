//! # Knowledge Engine Core
//!
//! Store-agnostic logic for Knowledge Engine: document ingestion with
//! atomic replace-and-rollback, tenant-scoped retrieval, and the traits the
//! pipelines consume.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chunk`] | Fixed-window chunking with overlap |
//! | [`embedding`] | [`Embedder`](embedding::Embedder) trait, offline hashing embedder, vector helpers |
//! | [`store`] | [`DocumentStore`](store::DocumentStore) and [`VectorStore`](store::VectorStore) traits, in-memory store |
//! | [`ingest`] | Create, update, delete state machines |
//! | [`retrieve`] | Query embedding, search, context assembly |
//! | [`engine`] | [`KnowledgeEngine`](engine::KnowledgeEngine) facade |
//! | [`error`] | Error taxonomy and rollback outcomes |
//! | [`models`] | Documents, chunk records, request types |
//!
//! This crate has no database or HTTP dependencies. The SQLite store and
//! the remote embedding providers live in the `knowledge-engine` crate.

mod bounded;
pub mod chunk;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod store;

#[cfg(test)]
mod test_support;

pub use engine::{EngineConfig, KnowledgeEngine};
pub use error::{EmbedError, EngineError, RollbackOutcome, Stage, StoreError};
