//! Builds a [`KnowledgeEngine`] from configuration.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use knowledge_engine_core::engine::KnowledgeEngine;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// An engine over the configured SQLite database, plus the pool so callers
/// can close it.
pub struct EngineHandle {
    pub engine: KnowledgeEngine,
    pub pool: SqlitePool,
}

impl EngineHandle {
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Connect, ensure the schema exists, and wire the configured embedder.
pub async fn open_engine(config: &Config) -> Result<EngineHandle> {
    let embedder = create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool.clone()).with_min_score(config.retrieval.min_score));
    tracing::debug!(
        db = %config.db.path.display(),
        model = embedder.model_name(),
        dims = embedder.dims(),
        "engine ready"
    );
    let engine = KnowledgeEngine::with_store(embedder, store, config.engine_config());
    Ok(EngineHandle { engine, pool })
}
