use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const TMP_SUFFIX: &str = "tmp";
pub const BACKUP_SUFFIX: &str = "bak";
pub const LOCK_SUFFIX: &str = "lock";
pub const QUARANTINE_SUFFIX: &str = "corrupt";

/// A canonical store file and the sibling paths used to replace it safely.
///
/// Siblings append a suffix to the full file name (`vectors.idx.tmp`), so two
/// stores sharing a stem in one directory never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistPaths {
    canonical: PathBuf,
}

impl PersistPaths {
    #[must_use]
    pub fn new(canonical: impl Into<PathBuf>) -> Self {
        Self {
            canonical: canonical.into(),
        }
    }

    #[must_use]
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    #[must_use]
    pub fn tmp(&self) -> PathBuf {
        self.sibling(TMP_SUFFIX)
    }

    #[must_use]
    pub fn backup(&self) -> PathBuf {
        self.sibling(BACKUP_SUFFIX)
    }

    /// Advisory lock file guarding reads and writes of the canonical file
    #[must_use]
    pub fn lock(&self) -> PathBuf {
        self.sibling(LOCK_SUFFIX)
    }

    /// Where an unrecoverable file is moved aside before starting over
    #[must_use]
    pub fn quarantine(&self) -> PathBuf {
        self.sibling(QUARANTINE_SUFFIX)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .canonical
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.canonical.with_file_name(name)
    }
}
