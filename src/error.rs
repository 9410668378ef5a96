//! Engine error taxonomy.
//!
//! Most variants are recovered inside the engine (placeholder text,
//! degraded embeddings, local fallback) and only reach callers through the
//! response envelopes. [`EngineError::Storage`] is the one kind that
//! propagates as an `Err`.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to extract {format} content: {message}")]
    ExtractionFailure { format: String, message: String },

    #[error("embedding service failed: {0}")]
    EmbeddingFailure(String),

    #[error("vector backend '{backend}' unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("deleted with warnings: {failed} chunk id(s) could not be removed from '{backend}'")]
    PartialDeleteFailure { backend: String, failed: usize },

    #[error("{0}")]
    InputInvalid(String),

    #[error("operation timed out after {0}s")]
    Timeout(u64),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Stable, serializable tag for an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExtractionFailure,
    EmbeddingFailure,
    BackendUnavailable,
    NotFound,
    PartialDeleteFailure,
    InputInvalid,
    Timeout,
    Storage,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ExtractionFailure { .. } => ErrorKind::ExtractionFailure,
            EngineError::EmbeddingFailure(_) => ErrorKind::EmbeddingFailure,
            EngineError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::PartialDeleteFailure { .. } => ErrorKind::PartialDeleteFailure,
            EngineError::InputInvalid(_) => ErrorKind::InputInvalid,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}
