//! # Knowledge Engine
//!
//! Multi-tenant knowledge ingestion and retrieval for retrieval-augmented
//! generation. Documents are chunked, embedded, and stored in SQLite;
//! queries return a ranked context block with `[Source N]` markers.
//!
//! The pipelines themselves live in `knowledge-engine-core`. This crate
//! provides the SQLite store, the remote embedding providers, configuration,
//! and the `kbe` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌──────────────┐
//! │   CLI    │──▶│ KnowledgeEngine  │──▶│  SqliteStore │
//! │  (kbe)   │   │ ingest/retrieve  │   │ docs+chunks  │
//! └──────────┘   └────────┬─────────┘   └──────────────┘
//!                         ▼
//!                  ┌─────────────┐
//!                  │  Embedder   │
//!                  │ OpenAI/...  │
//!                  └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbe init
//! kbe create --tenant t1 --title Hours --file hours.txt
//! kbe retrieve --tenant t1 "when do you open"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite document and vector store |
//! | [`embedding`] | Embedding providers |
//! | [`engine`] | Engine construction from config |
//! | [`documents`] | Create, update, delete, and chunk listing commands |
//! | [`retrieve`] | Retrieval command |

pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod engine;
pub mod migrate;
pub mod retrieve;
pub mod sqlite_store;
