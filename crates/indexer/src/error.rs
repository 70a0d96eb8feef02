use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] cognisync_text_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] cognisync_vector_store::VectorStoreError),

    #[error("Extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    pub(crate) fn extraction(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}
