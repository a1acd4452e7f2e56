//! TOML configuration for the `kbe` binary.
//!
//! ```toml
//! [db]
//! path = "./data/kbe.sqlite"
//!
//! [chunking]
//! max_chars = 900
//! overlap_chars = 120
//!
//! [retrieval]
//! default_k = 5
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```
//!
//! Only `[db]` is required. Secrets such as `OPENAI_API_KEY` are read from
//! the environment, never from this file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use knowledge_engine_core::chunk::{ChunkerConfig, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP_CHARS};
use knowledge_engine_core::engine::EngineConfig;
use knowledge_engine_core::ingest::PipelineConfig;
use knowledge_engine_core::retrieve::DEFAULT_K;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}
fn default_overlap_chars() -> usize {
    DEFAULT_OVERLAP_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Similarity floor applied by the store. Hits scoring below it are dropped.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            min_score: None,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// API base URL for the `openai` and `ollama` providers. Defaults to
    /// each provider's public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_one")]
    pub batch_size: usize,
    #[serde(default = "default_one")]
    pub concurrency: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: 1,
            concurrency: 1,
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_one() -> usize {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default = "default_serialize_updates")]
    pub serialize_updates: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            embed_timeout_secs: default_embed_timeout_secs(),
            store_timeout_secs: default_store_timeout_secs(),
            serialize_updates: default_serialize_updates(),
        }
    }
}

fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_store_timeout_secs() -> u64 {
    10
}
fn default_serialize_updates() -> bool {
    true
}

impl Config {
    /// Engine tuning derived from this file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            pipeline: PipelineConfig {
                chunker: ChunkerConfig {
                    max_chars: self.chunking.max_chars,
                    overlap_chars: self.chunking.overlap_chars,
                },
                embed_timeout: Duration::from_secs(self.pipeline.embed_timeout_secs),
                store_timeout: Duration::from_secs(self.pipeline.store_timeout_secs),
                embed_batch_size: self.embedding.batch_size,
                embed_concurrency: self.embedding.concurrency,
                serialize_updates: self.pipeline.serialize_updates,
            },
            default_k: self.retrieval.default_k,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    ChunkerConfig::new(config.chunking.max_chars, config.chunking.overlap_chars)
        .map_err(|e| anyhow::anyhow!("invalid [chunking]: {}", e))?;

    // Validate retrieval
    if config.retrieval.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }
    if let Some(min) = config.retrieval.min_score {
        if !(-1.0..=1.0).contains(&min) {
            anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "hashing" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or hashing.",
            other
        ),
    }
    if embedding.is_enabled() && embedding.dims == Some(0) {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            embedding.provider
        );
    }
    if embedding.provider == "ollama" && (embedding.model.is_none() || embedding.dims.is_none()) {
        anyhow::bail!("embedding.model and embedding.dims must be specified when provider is 'ollama'");
    }
    if embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    if embedding.concurrency == 0 {
        anyhow::bail!("embedding.concurrency must be >= 1");
    }

    // Validate pipeline timeouts
    if config.pipeline.embed_timeout_secs == 0 || config.pipeline.store_timeout_secs == 0 {
        anyhow::bail!("pipeline timeouts must be > 0 seconds");
    }

    Ok(())
}
