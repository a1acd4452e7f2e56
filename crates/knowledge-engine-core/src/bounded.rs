//! Timeout wrappers for collaborator calls.
//!
//! Every embedder and store call made by the pipelines goes through one of
//! these so that no operation blocks indefinitely. An elapsed timeout is
//! reported as [`EngineError::Timeout`], which is transient.

use std::future::Future;
use std::time::Duration;

use crate::error::{EmbedError, EngineError, Stage, StoreError};

pub(crate) async fn store_call<T, F>(stage: Stage, after: Duration, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(EngineError::store(stage, e)),
        Err(_) => Err(EngineError::Timeout { stage, after }),
    }
}

pub(crate) async fn embed_call<T, F>(stage: Stage, after: Duration, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EmbedError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(EngineError::embedding(stage, e)),
        Err(_) => Err(EngineError::Timeout { stage, after }),
    }
}
