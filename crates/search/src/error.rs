use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] cognisync_vector_store::VectorStoreError),

    #[error("Indexer error: {0}")]
    IndexerError(#[from] cognisync_indexer::IndexerError),

    #[error("Empty query")]
    EmptyQuery,
}
