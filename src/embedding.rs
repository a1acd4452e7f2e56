//! Concrete embedding providers.
//!
//! Implementations of the core [`Embedder`] trait:
//! - **[`DisabledEmbedder`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HashingEmbedder`]**: deterministic and offline, re-exported from the core crate.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use knowledge_engine::config::EmbeddingConfig;
//! # use knowledge_engine::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```
//!
//! # Failure classification
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → [`EmbedError::Transient`]
//! - HTTP 4xx (client error, not 429) → [`EmbedError::Permanent`]
//! - Network errors and client timeouts → [`EmbedError::Transient`]
//! - Malformed response bodies → [`EmbedError::Permanent`]
//!
//! The engine does not retry. `embedding.max_retries` (default `0`) enables
//! provider-level retries of transient failures with exponential backoff:
//! 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5).

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use knowledge_engine_core::embedding::{Embedder, HashingEmbedder};
use knowledge_engine_core::error::EmbedError;

use crate::config::EmbeddingConfig;

pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_DIMS: usize = 1536;
const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_HASHING_DIMS: usize = 256;

// ============ Disabled Provider ============

/// An embedder that always fails.
///
/// Used when `embedding.provider = "disabled"` in the configuration. Every
/// call fails with a permanent error, so ingestion is rejected and
/// retrieval reports itself unavailable.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Permanent(
            "embedding provider is disabled; set [embedding].provider".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedder using the OpenAI API.
///
/// Calls `POST {url}/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable. Overrides
/// [`Embedder::embed_batch`] to send several inputs per request.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment or
    /// the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };
        Self::with_api_key(config, api_key)
    }

    /// Create an embedder with an explicit API key.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            api_key,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            dims: config.dims.unwrap_or(DEFAULT_OPENAI_DIMS),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/embeddings", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body);

        let json = send_with_retry("OpenAI", request, self.max_retries).await?;
        parse_openai_response(&json)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays and orders them by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| malformed("OpenAI", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| malformed("OpenAI", "missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedder using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model to be pulled,
/// e.g. `ollama pull nomic-embed-text`.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;

        Ok(Self {
            client: http_client(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_URL.to_string()),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body);

        let json = send_with_retry("Ollama", request, self.max_retries).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| malformed("Ollama", "missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding
                .as_array()
                .ok_or_else(|| malformed("Ollama", "embedding is not an array"))?;
            to_f32(values, "Ollama")
        })
        .collect()
}

// ============ Shared HTTP plumbing ============

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Send `request`, retrying transient failures up to `max_retries` times.
async fn send_with_retry(
    provider: &str,
    request: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<serde_json::Value, EmbedError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let Some(attempt_request) = request.try_clone() else {
            return Err(EmbedError::Permanent(format!(
                "{provider} request body cannot be retried"
            )));
        };

        match attempt_request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        EmbedError::Permanent(format!("{provider} response was not JSON: {e}"))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = classify_status(provider, status, &body_text);
                if !err.is_transient() {
                    return Err(err);
                }
                last_err = Some(err);
            }
            Err(e) => {
                last_err = Some(EmbedError::Transient(format!(
                    "{provider} connection error: {e}"
                )));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        EmbedError::Transient(format!("{provider} embedding failed after retries"))
    }))
}

fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> EmbedError {
    let message = format!("{provider} API error {status}: {body}");
    if status.as_u16() == 429 || status.is_server_error() {
        EmbedError::Transient(message)
    } else {
        EmbedError::Permanent(message)
    }
}

fn to_f32(values: &[serde_json::Value], provider: &str) -> Result<Vec<f32>, EmbedError> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| malformed(provider, "non-numeric embedding value"))
        })
        .collect()
}

fn malformed(provider: &str, what: &str) -> EmbedError {
    EmbedError::Permanent(format!("Invalid {provider} response: {what}"))
}

fn single(mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>, EmbedError> {
    if vectors.len() != 1 {
        return Err(EmbedError::Permanent(format!(
            "expected 1 embedding, got {}",
            vectors.len()
        )));
    }
    Ok(vectors.remove(0))
}

/// Create the [`Embedder`] selected by configuration.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hashing"` | [`HashingEmbedder`] |
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider cannot
/// be initialized (missing model, dims, or API key).
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASHING_DIMS),
        ))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
