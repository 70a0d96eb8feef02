//! # Cognisync Vector Store
//!
//! Durable storage for document vectors and the mapping that ties each vector
//! back to the file it was computed from.
//!
//! ## Features
//!
//! - **Exhaustive inner-product search** over an append-only [`FlatIndex`]
//! - **Advisory file locks** with bounded retry on contention
//! - **Atomic replacement** of store files through `.tmp` / `.bak` siblings
//! - **Corruption recovery** from backups, with unreadable files moved aside
//! - **Cached loads** validated against the on-disk fingerprint
//!
//! ## Architecture
//!
//! ```text
//! text ──> Embedder ──> Vec<f32>
//!                          │
//!              ┌───────────┴────────────┐
//!              ▼                        ▼
//!         IndexStore               MappingStore
//!     vectors.idx (CSFX)       mapping.json (doc_id -> hash -> path)
//!              │                        │
//!              └──── AtomicWrite + FileLock ────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use cognisync_vector_store::{IndexStore, LockPolicy, StubEmbedder};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cognisync_vector_store::Result<()> {
//!     let embedder = Arc::new(StubEmbedder::new(384)?);
//!     let store = IndexStore::new("search_index/vectors.idx", embedder, LockPolicy::default());
//!
//!     let index = store.load(true).await?;
//!     println!("{} vectors of dim {}", index.len(), index.dimension());
//!     Ok(())
//! }
//! ```

mod atomic_write;
mod embeddings;
mod error;
mod file_lock;
mod flat_index;
mod index_store;
mod mapping_store;
mod paths;

pub use atomic_write::{quarantine, recover_interrupted_commit, restore_backup, AtomicWrite};
pub use embeddings::{probe_dimension, Embedder, StubEmbedder, PROBE_TEXT};
pub use error::{Result, VectorStoreError};
pub use file_lock::{retry_on_lock_timeout, FileLock, LockMode, LockPolicy};
pub use flat_index::{FlatIndex, IndexHeader, HEADER_LEN, INDEX_MAGIC};
pub use index_store::IndexStore;
pub use mapping_store::{Mapping, MappingStore};
pub use paths::PersistPaths;
