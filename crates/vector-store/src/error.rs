use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out after {waited_ms}ms waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Gave up on lock {} after {attempts} attempts", path.display())]
    LockRetriesExhausted { path: PathBuf, attempts: u32 },

    #[error("Corrupted store file: {0}")]
    Corruption(String),

    #[error("Inconsistent mapping: {0}")]
    Consistency(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("{0}")]
    Other(String),
}

impl VectorStoreError {
    /// Lock contention is the only failure worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    pub(crate) fn join(err: &tokio::task::JoinError) -> Self {
        Self::Other(format!("join blocking store task: {err}"))
    }
}
