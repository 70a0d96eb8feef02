use crate::error::{Result, VectorStoreError};
use crate::file_lock::{FileLock, LockMode};
use crate::paths::PersistPaths;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Scoped, exclusive replacement of a canonical store file.
///
/// `begin` takes the exclusive advisory lock, `write` fills the temporary
/// sibling and fsyncs it, `commit` swaps it into place:
///
/// ```text
/// canonical ──rename──> .bak
/// .tmp      ──rename──> canonical
/// .bak      ──remove
/// ```
///
/// Dropping the guard before `commit` finished removes the temporary file and,
/// if the canonical file had already been moved to `.bak`, moves it back. The
/// canonical path therefore always holds either the old or the new complete
/// content.
pub struct AtomicWrite {
    paths: PersistPaths,
    _lock: FileLock,
    tmp_written: bool,
    backed_up: bool,
    committed: bool,
}

impl AtomicWrite {
    pub fn begin(paths: &PersistPaths, timeout: Duration) -> Result<Self> {
        if let Some(parent) = paths.canonical().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock = FileLock::acquire(&paths.lock(), LockMode::Exclusive, timeout)?;
        Ok(Self {
            paths: paths.clone(),
            _lock: lock,
            tmp_written: false,
            backed_up: false,
            committed: false,
        })
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let tmp = self.paths.tmp();
        self.tmp_written = true;
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Swap the written content into place. The lock is held until the
    /// guard is dropped.
    pub fn commit(&mut self) -> Result<()> {
        if !self.tmp_written {
            return Err(VectorStoreError::Other(format!(
                "commit of {} without written content",
                self.paths.canonical().display()
            )));
        }

        let canonical = self.paths.canonical().to_path_buf();
        let backup = self.paths.backup();

        if backup.exists() {
            std::fs::remove_file(&backup)?;
        }
        if canonical.exists() {
            std::fs::rename(&canonical, &backup)?;
            self.backed_up = true;
        }
        std::fs::rename(self.paths.tmp(), &canonical)?;
        self.committed = true;

        if let Some(parent) = canonical.parent() {
            sync_dir(parent);
        }
        if self.backed_up {
            if let Err(err) = std::fs::remove_file(&backup) {
                log::warn!("Failed to remove backup {}: {err}", backup.display());
            }
        }
        Ok(())
    }
}

impl Drop for AtomicWrite {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if self.tmp_written {
            let _ = std::fs::remove_file(self.paths.tmp());
        }
        if self.backed_up && !self.paths.canonical().exists() {
            match std::fs::rename(self.paths.backup(), self.paths.canonical()) {
                Ok(()) => log::warn!(
                    "Restored {} from backup after failed write",
                    self.paths.canonical().display()
                ),
                Err(err) => log::error!(
                    "Backup restoration of {} failed: {err}",
                    self.paths.canonical().display()
                ),
            }
        }
    }
}

/// Replace a corrupt canonical file with its backup, if there is one.
pub fn restore_backup(paths: &PersistPaths, timeout: Duration) -> Result<bool> {
    let _lock = FileLock::acquire(&paths.lock(), LockMode::Exclusive, timeout)?;
    if !paths.backup().exists() {
        return Ok(false);
    }
    std::fs::rename(paths.backup(), paths.canonical())?;
    log::warn!("Restored {} from backup", paths.canonical().display());
    Ok(true)
}

/// Move an unreadable canonical file aside so the next write starts clean.
pub fn quarantine(paths: &PersistPaths, timeout: Duration) -> Result<Option<std::path::PathBuf>> {
    let _lock = FileLock::acquire(&paths.lock(), LockMode::Exclusive, timeout)?;
    if !paths.canonical().exists() {
        return Ok(None);
    }
    let target = paths.quarantine();
    std::fs::rename(paths.canonical(), &target)?;
    Ok(Some(target))
}

/// Finish a commit that crashed between its two renames: no canonical file,
/// but a backup. Returns whether the backup was moved back into place.
pub fn recover_interrupted_commit(paths: &PersistPaths, timeout: Duration) -> Result<bool> {
    if paths.canonical().exists() || !paths.backup().exists() {
        return Ok(false);
    }
    let _lock = FileLock::acquire(&paths.lock(), LockMode::Exclusive, timeout)?;
    if paths.canonical().exists() || !paths.backup().exists() {
        return Ok(false);
    }
    std::fs::rename(paths.backup(), paths.canonical())?;
    log::warn!(
        "Recovered {} from backup left by an interrupted write",
        paths.canonical().display()
    );
    Ok(true)
}

#[cfg(unix)]
fn sync_dir(path: &Path) {
    if let Ok(dir) = File::open(path) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) {}
