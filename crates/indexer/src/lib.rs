//! # Cognisync Indexer
//!
//! Turns documents on disk into deduplicated entries of a persistent vector
//! index.
//!
//! ## Pipeline
//!
//! ```text
//! File
//!     │
//!     ├──> TextExtractor
//!     │      └─> plain text (empty -> skipped)
//!     │
//!     ├──> ContentHash (SHA-256 of NFC text)
//!     │      └─> already mapped -> skipped
//!     │
//!     ├──> Chunker + Embedder + mean pooling
//!     │      └─> one document vector
//!     │
//!     └──> IndexState (ingest lock)
//!            └─> append, save mapping, save index
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use cognisync_indexer::{IngestPipeline, Settings};
//! use cognisync_vector_store::StubEmbedder;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cognisync_indexer::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let embedder = Arc::new(StubEmbedder::new(settings.embedding_dimension)?);
//!     let pipeline = IngestPipeline::from_settings(&settings, embedder)?;
//!
//!     let report = pipeline.ingest_directory("docs".as_ref()).await?;
//!     println!("{} new, {} skipped, {} errors", report.succeeded, report.skipped, report.errors);
//!     Ok(())
//! }
//! ```

mod config;
mod content_hash;
mod error;
mod extract;
mod index_lock;
mod index_state;
mod ingest;
mod stats;

pub use config::{Settings, ENV_PREFIX, INGEST_LOCK_FILE};
pub use content_hash::{content_hash, ContentHash, HASH_BLOCK_BYTES};
pub use error::{IndexerError, Result};
pub use extract::{PlainTextExtractor, TextExtractor, PLAIN_TEXT_EXTENSIONS};
pub use index_lock::{ingest_lock_wait_ms_last, ingest_lock_wait_ms_max};
pub use index_state::{CommitOutcome, ConsistencyReport, IndexSnapshot, IndexState};
pub use ingest::{IngestPipeline, IngestStage};
pub use stats::{IngestOutcome, IngestReport, IngestStatus, REASON_EMPTY_CONTENT, REASON_EXISTS};
