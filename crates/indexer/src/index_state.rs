use crate::config::Settings;
use crate::content_hash::ContentHash;
use crate::error::Result;
use crate::index_lock::acquire_ingest_lock;
use cognisync_vector_store::{Embedder, FlatIndex, IndexStore, LockPolicy, Mapping, MappingStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Read-only view of the index and mapping at one point in time.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub index: Arc<FlatIndex>,
    pub mapping: Arc<Mapping>,
}

impl IndexSnapshot {
    /// Resolve `doc_id` to its content hash and source path.
    #[must_use]
    pub fn resolve(&self, doc_id: u64) -> Option<(&str, &str)> {
        self.mapping.resolve(doc_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Added { doc_id: u64 },
    /// Another writer recorded the same content first
    Exists,
}

/// Health of the persisted index and mapping as found on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub index_path: PathBuf,
    pub mapping_path: PathBuf,
    pub dimension: usize,
    pub vector_count: usize,
    pub doc_ids: usize,
    pub paths: usize,
    /// Mapped doc_ids with no vector behind them
    pub dangling_doc_ids: Vec<u64>,
    /// Vectors no doc_id points at
    pub unreferenced_vectors: usize,
    pub missing_files: Vec<String>,
    pub valid: bool,
}

struct LiveState {
    index: Option<Arc<FlatIndex>>,
    mapping: Arc<Mapping>,
}

/// Process-wide live view of the vector index and its mapping.
///
/// Hydrated lazily from disk, refreshed whenever the index store hands out a
/// different index than the one held (another writer committed), and mutated
/// only through [`IndexState::commit_document`].
pub struct IndexState {
    index_store: IndexStore,
    mapping_store: MappingStore,
    ingest_lock_path: PathBuf,
    ingest_policy: LockPolicy,
    live: Mutex<LiveState>,
}

impl IndexState {
    #[must_use]
    pub fn new(settings: &Settings, embedder: Arc<dyn Embedder>) -> Self {
        Self::from_stores(
            IndexStore::new(settings.index_path(), embedder, settings.index_lock_policy()),
            MappingStore::new(settings.mapping_path(), settings.mapping_lock_policy()),
            settings.ingest_lock_path(),
            settings.index_lock_policy(),
        )
    }

    #[must_use]
    pub fn from_stores(
        index_store: IndexStore,
        mapping_store: MappingStore,
        ingest_lock_path: PathBuf,
        ingest_policy: LockPolicy,
    ) -> Self {
        Self {
            index_store,
            mapping_store,
            ingest_lock_path,
            ingest_policy,
            live: Mutex::new(LiveState {
                index: None,
                mapping: Arc::new(Mapping::default()),
            }),
        }
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        self.index_store.path()
    }

    #[must_use]
    pub fn mapping_path(&self) -> &Path {
        self.mapping_store.path()
    }

    pub async fn snapshot(&self) -> Result<IndexSnapshot> {
        let mut live = self.live.lock().await;
        let index = self.hydrate(&mut live).await?;
        Ok(IndexSnapshot {
            index,
            mapping: Arc::clone(&live.mapping),
        })
    }

    /// Path already recorded for `hash`, if any.
    pub async fn find_existing(&self, hash: &ContentHash) -> Result<Option<String>> {
        let mut live = self.live.lock().await;
        self.hydrate(&mut live).await?;
        Ok(live.mapping.path_of(hash.as_str()).map(ToOwned::to_owned))
    }

    /// Append `vector` and record `hash -> path` for it, then persist the
    /// mapping followed by the index.
    ///
    /// Runs under the cross-process ingest lock and the in-process state
    /// lock. If either save fails the live state is left as it was and the
    /// mapping on disk is put back.
    pub async fn commit_document(
        &self,
        hash: &ContentHash,
        path: &Path,
        vector: &[f32],
    ) -> Result<CommitOutcome> {
        let _ingest = acquire_ingest_lock(&self.ingest_lock_path, &self.ingest_policy).await?;
        let mut live = self.live.lock().await;
        let mut index = self.hydrate(&mut live).await?;

        if live.mapping.contains_hash(hash.as_str()) {
            return Ok(CommitOutcome::Exists);
        }

        let doc_id = Arc::make_mut(&mut index).add(vector)?;
        let mut mapping = Mapping::clone(&live.mapping);
        mapping.insert(doc_id, hash.as_str(), path.to_string_lossy());

        self.mapping_store.save(&mapping).await?;
        if let Err(err) = self.index_store.save(Arc::clone(&index)).await {
            log::error!("Index save failed after mapping update for doc_id {doc_id}, reverting mapping");
            if let Err(revert) = self.mapping_store.save(&live.mapping).await {
                log::error!("Mapping revert failed, entry will be dropped on next load: {revert}");
            }
            return Err(err.into());
        }

        live.index = Some(index);
        live.mapping = Arc::new(mapping);
        Ok(CommitOutcome::Added { doc_id })
    }

    /// Inspect the stores on disk without touching the live state.
    pub async fn check(&self) -> Result<ConsistencyReport> {
        let index = self.index_store.load(true).await?;
        let mapping = self.mapping_store.load().await?;
        let vector_count = index.len();

        let dangling_doc_ids: Vec<u64> = mapping
            .doc_id_map
            .range(vector_count as u64..)
            .map(|(id, _)| *id)
            .collect();
        let referenced = mapping.doc_id_map.len() - dangling_doc_ids.len();
        let missing_files: Vec<String> = mapping
            .missing_files()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect();
        let valid = mapping.validate() && dangling_doc_ids.is_empty();

        Ok(ConsistencyReport {
            index_path: self.index_path().to_path_buf(),
            mapping_path: self.mapping_path().to_path_buf(),
            dimension: index.dimension(),
            vector_count,
            doc_ids: mapping.doc_id_map.len(),
            paths: mapping.path_map.len(),
            dangling_doc_ids,
            unreferenced_vectors: vector_count.saturating_sub(referenced),
            missing_files,
            valid,
        })
    }

    async fn hydrate(&self, live: &mut LiveState) -> Result<Arc<FlatIndex>> {
        let index = self.index_store.load(true).await?;
        let unchanged = live
            .index
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &index));
        if unchanged {
            return Ok(index);
        }

        let mut mapping = self.mapping_store.load().await?;
        let dangling = mapping.retain_below(index.len() as u64);
        if !dangling.is_empty() {
            log::warn!(
                "Dropped {} mapping entries past the end of the index (vector count {}): {:?}",
                dangling.len(),
                index.len(),
                dangling
            );
        }
        log::debug!(
            "Hydrated index state (ntotal={}, doc_ids={})",
            index.len(),
            mapping.len()
        );
        live.index = Some(Arc::clone(&index));
        live.mapping = Arc::new(mapping);
        Ok(index)
    }
}
