//! # Cognisync Search
//!
//! Question answering retrieval over the persisted index:
//!
//! ```text
//! question ──> Embedder ──> FlatIndex::search (top k)
//!                               │
//!                               ├──> Mapping: doc_id -> hash -> path
//!                               ├──> drop unresolved / vanished sources
//!                               └──> threshold ──> QueryHit[] ──> gather_context
//! ```

mod error;
mod query;
mod threshold;

pub use error::{Result, SearchError};
pub use query::{QueryHit, QueryPipeline};
pub use threshold::apply_threshold;
