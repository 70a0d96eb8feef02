//! # Cognisync Text Chunker
//!
//! Language-agnostic windowing of long documents for embedding, plus the
//! pooling step that folds per-chunk vectors back into one document vector.
//!
//! ## Pipeline
//!
//! ```text
//! Document text
//!     │
//!     ├──> Whitespace tokenization
//!     │
//!     ├──> Overlapping windows (W tokens, step W - overlap)
//!     │      └─> chunk[0], chunk[1], ...
//!     │
//!     └──> (after embedding) Mean pooling + L2 normalization
//!            └─> one document vector
//! ```
//!
//! ## Example
//!
//! ```rust
//! use cognisync_text_chunker::{TextChunker, ChunkerConfig};
//!
//! let chunker = TextChunker::new(ChunkerConfig::with_window(4)).unwrap();
//! let chunks = chunker.chunk("a b c d e f g");
//! assert_eq!(chunks, vec!["a b c d", "c d e f", "e f g"]);
//! ```

mod chunker;
mod config;
mod error;
mod pooling;

pub use chunker::{chunk_text, TextChunker};
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use pooling::{l2_normalize, mean_pool};
