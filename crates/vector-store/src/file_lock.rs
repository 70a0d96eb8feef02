use crate::error::{Result, VectorStoreError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Timeouts and retry schedule for advisory lock acquisition.
///
/// Writes get a longer timeout than reads: they are rarer but must not be
/// interrupted half way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(15),
            attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Held advisory lock; released on drop.
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block (polling) until the lock is held or `timeout` elapses.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let contended = fs2::lock_contended_error().kind();
        let start = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(err) if err.kind() == contended => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(VectorStoreError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Run `op` again after `retry_delay` whenever it fails on a lock timeout,
/// up to `attempts` times in total. Any other outcome is returned as is.
pub async fn retry_on_lock_timeout<T, F, Fut>(policy: &LockPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Err(VectorStoreError::LockTimeout { path, waited_ms }) => {
                if attempt >= attempts {
                    log::error!(
                        "Failed to acquire lock {} for {what} after {attempts} attempts",
                        path.display()
                    );
                    return Err(VectorStoreError::LockRetriesExhausted { path, attempts });
                }
                log::warn!(
                    "Lock acquisition for {what} timed out after {waited_ms}ms, retrying {attempt}/{attempts}"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            other => return other,
        }
    }
}

/// Run blocking file work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| VectorStoreError::join(&err))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn shared_locks_coexist() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.lock");
        let _a = FileLock::acquire(&path, LockMode::Shared, Duration::from_millis(50)).unwrap();
        let _b = FileLock::acquire(&path, LockMode::Shared, Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn exclusive_holder_times_out_others() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.lock");
        let held = FileLock::acquire(&path, LockMode::Exclusive, Duration::from_millis(50)).unwrap();

        let err = FileLock::acquire(&path, LockMode::Shared, Duration::from_millis(60))
            .err()
            .expect("shared lock must time out");
        assert!(err.is_retryable());

        drop(held);
        FileLock::acquire(&path, LockMode::Exclusive, Duration::from_millis(50)).unwrap();
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let policy = LockPolicy {
            attempts: 3,
            retry_delay: Duration::from_millis(1),
            ..LockPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_lock_timeout(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(VectorStoreError::LockTimeout {
                    path: PathBuf::from("x.lock"),
                    waited_ms: 1,
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(VectorStoreError::LockRetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn non_lock_errors_are_not_retried() {
        let policy = LockPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_lock_timeout(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VectorStoreError::Corruption("bad".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(VectorStoreError::Corruption(_))));
    }
}
