use crate::atomic_write::{quarantine, recover_interrupted_commit, restore_backup, AtomicWrite};
use crate::embeddings::{probe_dimension, Embedder};
use crate::error::{Result, VectorStoreError};
use crate::file_lock::{retry_on_lock_timeout, run_blocking, FileLock, LockMode, LockPolicy};
use crate::flat_index::{FlatIndex, IndexHeader};
use crate::paths::PersistPaths;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// What the cache compares against before trusting its copy: the file's
/// modification time and the vector count from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiskFingerprint {
    modified: SystemTime,
    count: i64,
}

#[derive(Clone)]
struct CachedIndex {
    index: Arc<FlatIndex>,
    fingerprint: DiskFingerprint,
}

enum DiskRead {
    Missing,
    Loaded(FlatIndex, DiskFingerprint),
    Corrupt(String),
}

/// Durable home of the vector index.
///
/// Loads are served from an in-process cache while the on-disk fingerprint is
/// unchanged. Every read takes a shared advisory lock, every write an exclusive
/// one, and lock timeouts are retried per [`LockPolicy`]. A corrupt file is
/// replaced by its backup when one exists; otherwise the store starts over with
/// an empty index sized by probing the embedder.
pub struct IndexStore {
    paths: PersistPaths,
    policy: LockPolicy,
    embedder: Arc<dyn Embedder>,
    cache: Mutex<Option<CachedIndex>>,
}

impl IndexStore {
    pub fn new(path: impl Into<std::path::PathBuf>, embedder: Arc<dyn Embedder>, policy: LockPolicy) -> Self {
        Self {
            paths: PersistPaths::new(path),
            policy,
            embedder,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.paths.canonical()
    }

    /// Load the index, from cache when `use_cache` is set and still valid.
    ///
    /// A missing file yields a fresh empty index that is not cached; it only
    /// becomes durable through [`IndexStore::save`].
    pub async fn load(&self, use_cache: bool) -> Result<Arc<FlatIndex>> {
        if use_cache {
            if let Some(cached) = self.cached() {
                let paths = self.paths.clone();
                match run_blocking(move || disk_fingerprint(&paths)).await {
                    Ok(Some(current)) if current == cached.fingerprint => {
                        log::debug!("Using cached index (ntotal={})", cached.index.len());
                        return Ok(cached.index);
                    }
                    Ok(_) => log::debug!("Cached index is stale, reloading"),
                    Err(err) => log::debug!("Could not fingerprint index, reloading: {err}"),
                }
            }
        }

        match self.read_with_retry().await? {
            DiskRead::Loaded(index, fingerprint) => {
                let index = Arc::new(index);
                log::info!(
                    "Loaded index from {} (ntotal={}, dim={})",
                    self.path().display(),
                    index.len(),
                    index.dimension()
                );
                if use_cache {
                    self.set_cache(CachedIndex {
                        index: Arc::clone(&index),
                        fingerprint,
                    });
                }
                Ok(index)
            }
            DiskRead::Missing => {
                log::warn!("Index not found at {}, creating new index", self.path().display());
                self.create_empty().await
            }
            DiskRead::Corrupt(reason) => {
                log::error!("Index loading failed: {reason}");
                self.recover_corrupted().await
            }
        }
    }

    /// Persist `index` atomically and make it the cached copy.
    pub async fn save(&self, index: Arc<FlatIndex>) -> Result<()> {
        let bytes: Arc<[u8]> = index.to_bytes()?.into();
        let timeout = self.policy.write_timeout;
        let result = retry_on_lock_timeout(&self.policy, "index save", || {
            let paths = self.paths.clone();
            let bytes = Arc::clone(&bytes);
            run_blocking(move || write_to_disk(&paths, &bytes, timeout))
        })
        .await;

        let fingerprint = match result {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                log::error!("Index save failed: {err}");
                return Err(err);
            }
        };
        log::info!(
            "Index saved to {} (ntotal={})",
            self.path().display(),
            index.len()
        );
        self.set_cache(CachedIndex { index, fingerprint });
        Ok(())
    }

    pub fn invalidate_cache(&self) {
        *self.cache_guard() = None;
    }

    async fn read_with_retry(&self) -> Result<DiskRead> {
        let timeout = self.policy.read_timeout;
        retry_on_lock_timeout(&self.policy, "index load", || {
            let paths = self.paths.clone();
            run_blocking(move || read_from_disk(&paths, timeout))
        })
        .await
    }

    async fn recover_corrupted(&self) -> Result<Arc<FlatIndex>> {
        self.invalidate_cache();
        let timeout = self.policy.write_timeout;
        let restored = retry_on_lock_timeout(&self.policy, "index backup restore", || {
            let paths = self.paths.clone();
            run_blocking(move || restore_backup(&paths, timeout))
        })
        .await?;

        if restored {
            log::warn!("Attempting index recovery from backup");
            match self.read_with_retry().await? {
                DiskRead::Loaded(index, _) => {
                    log::info!("Index recovered from backup (ntotal={})", index.len());
                    return Ok(Arc::new(index));
                }
                DiskRead::Missing => {}
                DiskRead::Corrupt(reason) => {
                    log::error!("Backup index is corrupt as well: {reason}");
                    self.quarantine_canonical().await?;
                }
            }
        } else {
            self.quarantine_canonical().await?;
        }

        log::error!(
            "No usable index at {}, starting over with an empty index",
            self.path().display()
        );
        self.create_empty().await
    }

    async fn quarantine_canonical(&self) -> Result<()> {
        let timeout = self.policy.write_timeout;
        let moved = retry_on_lock_timeout(&self.policy, "index quarantine", || {
            let paths = self.paths.clone();
            run_blocking(move || quarantine(&paths, timeout))
        })
        .await?;
        if let Some(target) = moved {
            log::warn!("Moved unreadable index to {}", target.display());
        }
        Ok(())
    }

    async fn create_empty(&self) -> Result<Arc<FlatIndex>> {
        let dimension = probe_dimension(self.embedder.as_ref()).await?;
        log::info!(
            "Created new index (dim={dimension}, model={})",
            self.embedder.model_id()
        );
        Ok(Arc::new(FlatIndex::new(dimension)?))
    }

    fn cached(&self) -> Option<CachedIndex> {
        self.cache_guard().clone()
    }

    fn set_cache(&self, entry: CachedIndex) {
        *self.cache_guard() = Some(entry);
    }

    fn cache_guard(&self) -> MutexGuard<'_, Option<CachedIndex>> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn disk_fingerprint(paths: &PersistPaths) -> Result<Option<DiskFingerprint>> {
    let canonical = paths.canonical();
    let metadata = match std::fs::metadata(canonical) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let header = IndexHeader::read_from_path(canonical)?;
    Ok(Some(DiskFingerprint {
        modified: metadata.modified()?,
        count: header.count,
    }))
}

fn read_from_disk(paths: &PersistPaths, timeout: Duration) -> Result<DiskRead> {
    recover_interrupted_commit(paths, timeout)?;
    if !paths.canonical().exists() {
        return Ok(DiskRead::Missing);
    }

    let _lock = FileLock::acquire(&paths.lock(), LockMode::Shared, timeout)?;
    let bytes = match std::fs::read(paths.canonical()) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(DiskRead::Missing),
        Err(err) => return Err(err.into()),
    };
    let modified = std::fs::metadata(paths.canonical())?.modified()?;

    match FlatIndex::from_bytes(&bytes) {
        Ok(index) => {
            let count = i64::try_from(index.len())
                .map_err(|_| VectorStoreError::Corruption("vector count overflow".into()))?;
            Ok(DiskRead::Loaded(index, DiskFingerprint { modified, count }))
        }
        Err(VectorStoreError::Corruption(reason)) => Ok(DiskRead::Corrupt(reason)),
        Err(err) => Err(err),
    }
}

fn write_to_disk(paths: &PersistPaths, bytes: &[u8], timeout: Duration) -> Result<DiskFingerprint> {
    let header = IndexHeader::parse(bytes)?;
    if header.count < 0 {
        return Err(VectorStoreError::Validation(format!(
            "refusing to save index with vector count {}",
            header.count
        )));
    }

    let mut guard = AtomicWrite::begin(paths, timeout)?;
    guard.write(bytes)?;
    guard.commit()?;
    let modified = std::fs::metadata(paths.canonical())?.modified()?;
    Ok(DiskFingerprint {
        modified,
        count: header.count,
    })
}
