use crate::{IndexerError, Result};
use cognisync_vector_store::{
    retry_on_lock_timeout, FileLock, LockMode, LockPolicy, VectorStoreError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static INGEST_LOCK_WAIT_MS_LAST: AtomicU64 = AtomicU64::new(0);
static INGEST_LOCK_WAIT_MS_MAX: AtomicU64 = AtomicU64::new(0);

pub fn ingest_lock_wait_ms_last() -> u64 {
    INGEST_LOCK_WAIT_MS_LAST.load(Ordering::Relaxed)
}

pub fn ingest_lock_wait_ms_max() -> u64 {
    INGEST_LOCK_WAIT_MS_MAX.load(Ordering::Relaxed)
}

fn update_lock_wait_ms(wait_ms: u64) {
    INGEST_LOCK_WAIT_MS_LAST.store(wait_ms, Ordering::Relaxed);
    INGEST_LOCK_WAIT_MS_MAX.fetch_max(wait_ms, Ordering::Relaxed);
}

/// Exclusive hold on the data directory's ingest lock; released on drop.
pub(crate) struct IngestLock {
    _lock: FileLock,
}

/// Serialize index append and persistence across processes sharing
/// `path`. Uses the write timeout and retry schedule of `policy`.
pub(crate) async fn acquire_ingest_lock(path: &Path, policy: &LockPolicy) -> Result<IngestLock> {
    let start = Instant::now();
    let timeout = policy.write_timeout;
    let lock = retry_on_lock_timeout(policy, "ingest", || {
        let path: PathBuf = path.to_path_buf();
        async move {
            let acquire = move || FileLock::acquire(&path, LockMode::Exclusive, timeout);
            match tokio::task::spawn_blocking(acquire).await {
                Ok(result) => result,
                Err(err) => Err(VectorStoreError::Other(format!("join ingest lock task: {err}"))),
            }
        }
    })
    .await
    .map_err(IndexerError::from)?;

    let waited = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    update_lock_wait_ms(waited);
    if waited > 1_000 {
        log::warn!("Waited {waited}ms for ingest lock {}", path.display());
    }
    Ok(IngestLock { _lock: lock })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_holder_waits_for_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ingest.lock");
        let policy = LockPolicy {
            write_timeout: Duration::from_millis(40),
            attempts: 2,
            retry_delay: Duration::from_millis(5),
            ..LockPolicy::default()
        };

        let held = acquire_ingest_lock(&path, &policy).await.unwrap();
        let err = acquire_ingest_lock(&path, &policy).await.err().unwrap();
        assert!(err.to_string().contains("after 2 attempts"), "{err}");

        drop(held);
        acquire_ingest_lock(&path, &policy).await.unwrap();
        assert!(ingest_lock_wait_ms_max() >= ingest_lock_wait_ms_last());
    }
}
