//! Error taxonomy for the ingestion and retrieval pipelines.
//!
//! Collaborator failures ([`EmbedError`], [`StoreError`]) carry an explicit
//! transient/permanent classification. The pipelines annotate them with the
//! [`Stage`] where they happened and re-surface them as [`EngineError`];
//! nothing is swallowed. Retries are left to the caller.

use std::fmt;
use std::time::Duration;

/// Failure reported by an [`Embedder`](crate::embedding::Embedder).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbedError {
    /// Timeout, rate limit, or server-side failure. Safe to retry.
    #[error("transient embedding failure: {0}")]
    Transient(String),
    /// Malformed input, auth failure, exhausted quota. Retrying will not help.
    #[error("embedding failed: {0}")]
    Permanent(String),
}

/// Failure reported by a [`VectorStore`](crate::store::VectorStore) or
/// [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("store failure: {0}")]
    Permanent(String),
}

impl EmbedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Pipeline states. Used to annotate errors and log transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Snapshotting,
    Chunking,
    Embedding,
    Deleting,
    Persisting,
    UpdatingMetadata,
    RollingBack,
    Searching,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Snapshotting => "snapshotting",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Deleting => "deleting",
            Stage::Persisting => "persisting",
            Stage::UpdatingMetadata => "updating metadata",
            Stage::RollingBack => "rolling back",
            Stage::Searching => "searching",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened when an update tried to restore its snapshot.
#[derive(Debug)]
pub enum RollbackOutcome {
    /// The pre-update chunk set was re-inserted.
    Restored { chunks: usize },
    /// Restoration failed; the document has no retrievable chunks.
    Failed(Box<EngineError>),
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackOutcome::Restored { chunks } => {
                write!(f, "rollback restored {chunks} previous chunks")
            }
            RollbackOutcome::Failed(e) => {
                write!(f, "rollback failed, document has no chunks: {e}")
            }
        }
    }
}

/// Errors surfaced by [`KnowledgeEngine`](crate::engine::KnowledgeEngine) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad input. Never retried, no side effects performed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Document missing or owned by a different tenant.
    #[error("document {document_id} not found for tenant {tenant_id}")]
    NotFound {
        tenant_id: String,
        document_id: String,
    },

    #[error("embedding failed while {stage}: {source}")]
    Embedding {
        stage: Stage,
        #[source]
        source: EmbedError,
    },

    #[error("store failed while {stage}: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("timed out after {after:?} while {stage}")]
    Timeout { stage: Stage, after: Duration },

    #[error("embedding dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisting new chunks failed after the old ones were deleted.
    #[error("persisting new chunks failed after delete: {source}; {rollback}")]
    PartialFailure {
        #[source]
        source: Box<EngineError>,
        rollback: RollbackOutcome,
    },

    /// Retrieval could not run. Distinct from an empty result.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] Box<EngineError>),

    /// The detached commit task ended without reporting a result.
    #[error("commit task aborted: {0}")]
    Aborted(String),
}

impl EngineError {
    /// Whether the caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Embedding { source, .. } => source.is_transient(),
            EngineError::Store { source, .. } => source.is_transient(),
            EngineError::Timeout { .. } => true,
            EngineError::RetrievalUnavailable(inner) => inner.is_transient(),
            EngineError::PartialFailure { rollback, source } => {
                matches!(rollback, RollbackOutcome::Restored { .. }) && source.is_transient()
            }
            EngineError::Validation(_)
            | EngineError::NotFound { .. }
            | EngineError::DimensionMismatch { .. }
            | EngineError::Aborted(_) => false,
        }
    }

    pub fn is_rollback_class(&self) -> bool {
        matches!(self, EngineError::PartialFailure { .. })
    }

    /// `Some(true)` if a rollback restored the snapshot, `Some(false)` if it
    /// failed, `None` if no rollback was attempted.
    pub fn rollback_succeeded(&self) -> Option<bool> {
        match self {
            EngineError::PartialFailure { rollback, .. } => {
                Some(matches!(rollback, RollbackOutcome::Restored { .. }))
            }
            _ => None,
        }
    }

    pub(crate) fn embedding(stage: Stage, source: EmbedError) -> Self {
        EngineError::Embedding { stage, source }
    }

    pub(crate) fn store(stage: Stage, source: StoreError) -> Self {
        EngineError::Store { stage, source }
    }
}
