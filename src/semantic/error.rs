//! Error types for the semantic search core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by embedding generation and the vector index store
#[derive(Debug, Error)]
pub enum SemanticError {
    /// The text-generation backend failed or returned something that is not an embedding
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Persisted index artifacts were missing, unreadable or inconsistent
    #[error("failed to load index from {}: {reason}", path.display())]
    IndexLoad { path: PathBuf, reason: String },

    /// Writing index artifacts to disk failed; in-memory state is ahead of disk
    #[error("failed to persist index to {}: {source}", path.display())]
    IndexPersist {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("embedding dimension must be greater than zero")]
    ZeroDimension,
}

impl SemanticError {
    pub(crate) fn persist(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::IndexPersist {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::IndexLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SemanticError>;
