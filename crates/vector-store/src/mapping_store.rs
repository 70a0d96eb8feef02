use crate::atomic_write::{quarantine, recover_interrupted_commit, AtomicWrite};
use crate::error::{Result, VectorStoreError};
use crate::file_lock::{retry_on_lock_timeout, run_blocking, FileLock, LockMode, LockPolicy};
use crate::paths::PersistPaths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Two-level lookup from a vector position to the file it came from:
/// `doc_id -> content hash -> path`.
///
/// Serialized as a JSON object with the two maps under `doc_id_map` and
/// `path_map`; doc_ids become decimal string keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub doc_id_map: BTreeMap<u64, String>,
    pub path_map: BTreeMap<String, String>,
}

impl Mapping {
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_id_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_id_map.is_empty()
    }

    #[must_use]
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.path_map.contains_key(hash)
    }

    #[must_use]
    pub fn path_of(&self, hash: &str) -> Option<&str> {
        self.path_map.get(hash).map(String::as_str)
    }

    /// Hash and path recorded for `doc_id`, if both links are present.
    #[must_use]
    pub fn resolve(&self, doc_id: u64) -> Option<(&str, &str)> {
        let hash = self.doc_id_map.get(&doc_id)?;
        let path = self.path_map.get(hash)?;
        Some((hash.as_str(), path.as_str()))
    }

    pub fn insert(&mut self, doc_id: u64, hash: impl Into<String>, path: impl Into<String>) {
        let hash = hash.into();
        self.path_map.insert(hash.clone(), path.into());
        self.doc_id_map.insert(doc_id, hash);
    }

    /// Forget `doc_id` together with the path of its hash.
    pub fn remove(&mut self, doc_id: u64) -> Option<String> {
        let hash = self.doc_id_map.remove(&doc_id)?;
        if !self.doc_id_map.values().any(|other| *other == hash) {
            self.path_map.remove(&hash);
        }
        Some(hash)
    }

    /// Drop every doc_id at or past `count`, returning the removed ids.
    pub fn retain_below(&mut self, count: u64) -> Vec<u64> {
        let dangling: Vec<u64> = self.doc_id_map.range(count..).map(|(id, _)| *id).collect();
        for doc_id in &dangling {
            self.remove(*doc_id);
        }
        dangling
    }

    /// doc_ids whose hash has no recorded path
    #[must_use]
    pub fn missing_hashes(&self) -> Vec<(u64, &str)> {
        self.doc_id_map
            .iter()
            .filter(|(_, hash)| !self.path_map.contains_key(hash.as_str()))
            .map(|(id, hash)| (*id, hash.as_str()))
            .collect()
    }

    /// Recorded paths that no longer exist on disk
    #[must_use]
    pub fn missing_files(&self) -> Vec<&str> {
        self.path_map
            .values()
            .filter(|path| !Path::new(path.as_str()).exists())
            .map(String::as_str)
            .collect()
    }

    pub fn check_consistency(&self) -> Result<()> {
        match self.missing_hashes().first() {
            None => Ok(()),
            Some((doc_id, hash)) => Err(VectorStoreError::Consistency(format!(
                "doc_id {doc_id} references hash {hash} which has no path"
            ))),
        }
    }

    /// Report-only validation: a hash without a path is an error, a path
    /// missing on disk only a warning. Returns `false` on any error.
    #[must_use]
    pub fn validate(&self) -> bool {
        let missing_hashes = self.missing_hashes();
        for (doc_id, hash) in &missing_hashes {
            log::error!("Mapping validation: doc_id {doc_id} has hash {hash} missing from path_map");
        }
        for path in self.missing_files() {
            log::warn!("Mapping validation: file {path} no longer exists");
        }
        missing_hashes.is_empty()
    }
}

/// Durable home of the [`Mapping`], guarded the same way as the index file.
pub struct MappingStore {
    paths: PersistPaths,
    policy: LockPolicy,
}

impl MappingStore {
    pub fn new(path: impl Into<std::path::PathBuf>, policy: LockPolicy) -> Self {
        Self {
            paths: PersistPaths::new(path),
            policy,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.paths.canonical()
    }

    /// Load the mapping. A missing file is an empty mapping; an unreadable
    /// one is repaired when possible and otherwise moved aside.
    pub async fn load(&self) -> Result<Mapping> {
        let timeout = self.policy.read_timeout;
        let raw = retry_on_lock_timeout(&self.policy, "mapping load", || {
            let paths = self.paths.clone();
            run_blocking(move || read_raw(&paths, timeout))
        })
        .await?;

        let Some(bytes) = raw else {
            log::debug!("No mapping at {}, starting empty", self.path().display());
            return Ok(Mapping::default());
        };
        let raw = match String::from_utf8(bytes) {
            Ok(raw) => raw,
            Err(err) => {
                log::error!("Mapping at {} is not valid UTF-8: {err}", self.path().display());
                return self.discard().await;
            }
        };

        match parse_mapping(&raw) {
            Ok(mapping) => {
                log::debug!(
                    "Loaded mapping (ids={}, paths={})",
                    mapping.doc_id_map.len(),
                    mapping.path_map.len()
                );
                Ok(mapping)
            }
            Err(err) => {
                log::error!("Mapping validation failed: {err}");
                self.recover(&raw).await
            }
        }
    }

    pub async fn save(&self, mapping: &Mapping) -> Result<()> {
        let bytes: Arc<[u8]> = serde_json::to_vec_pretty(mapping)?.into();
        let timeout = self.policy.write_timeout;
        let result = retry_on_lock_timeout(&self.policy, "mapping save", || {
            let paths = self.paths.clone();
            let bytes = Arc::clone(&bytes);
            run_blocking(move || {
                let mut guard = AtomicWrite::begin(&paths, timeout)?;
                guard.write(&bytes)?;
                guard.commit()
            })
        })
        .await;

        match result {
            Ok(()) => {
                log::info!(
                    "Mappings saved (ids={}, paths={})",
                    mapping.doc_id_map.len(),
                    mapping.path_map.len()
                );
                Ok(())
            }
            Err(err) => {
                log::error!("Mapping save failed: {err}");
                Err(err)
            }
        }
    }

    async fn recover(&self, raw: &str) -> Result<Mapping> {
        log::warn!("Attempting mapping recovery");
        if let Some(repaired) = close_truncated_json(raw) {
            match parse_mapping(&repaired) {
                Ok(mapping) => {
                    if let Err(err) = self.save(&mapping).await {
                        log::warn!("Repaired mapping could not be written back: {err}");
                    }
                    log::info!("Mapping recovery successful");
                    return Ok(mapping);
                }
                Err(err) => log::warn!("Repaired mapping is still unusable: {err}"),
            }
        }
        self.discard().await
    }

    /// Move the unusable file aside and start from an empty mapping.
    async fn discard(&self) -> Result<Mapping> {
        let timeout = self.policy.write_timeout;
        let moved = retry_on_lock_timeout(&self.policy, "mapping quarantine", || {
            let paths = self.paths.clone();
            run_blocking(move || quarantine(&paths, timeout))
        })
        .await?;
        match moved {
            Some(target) => log::error!(
                "Mapping recovery failed, moved {} aside to {} and starting empty",
                self.path().display(),
                target.display()
            ),
            None => log::error!("Mapping recovery failed, starting empty"),
        }
        Ok(Mapping::default())
    }
}

fn read_raw(paths: &PersistPaths, timeout: Duration) -> Result<Option<Vec<u8>>> {
    recover_interrupted_commit(paths, timeout)?;
    if !paths.canonical().exists() {
        return Ok(None);
    }
    let _lock = FileLock::acquire(&paths.lock(), LockMode::Shared, timeout)?;
    match std::fs::read(paths.canonical()) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_mapping(raw: &str) -> Result<Mapping> {
    let mapping: Mapping = serde_json::from_str(raw)?;
    mapping.check_consistency()?;
    Ok(mapping)
}

/// Close the brackets left open by a write cut short. Gives up when the text
/// ends inside a string, since completing a half-written path would invent data.
fn close_truncated_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end();
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in trimmed.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.pop() != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
    }

    if in_string || open.is_empty() {
        return None;
    }
    let mut repaired = trimmed
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string();
    repaired.extend(open.iter().rev());
    Some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fast_policy() -> LockPolicy {
        LockPolicy {
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(100),
            attempts: 2,
            retry_delay: Duration::from_millis(10),
        }
    }

    fn sample() -> Mapping {
        let mut mapping = Mapping::default();
        mapping.insert(0, "h0", "/docs/a.txt");
        mapping.insert(1, "h1", "/docs/b.txt");
        mapping
    }

    #[test]
    fn serialized_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "doc_id_map": {"0": "h0", "1": "h1"},
                "path_map": {"h0": "/docs/a.txt", "h1": "/docs/b.txt"}
            })
        );
    }

    #[test]
    fn consistency_requires_a_path_for_every_hash() {
        let mut mapping = sample();
        assert!(mapping.check_consistency().is_ok());
        mapping.path_map.remove("h1");
        let err = mapping.check_consistency().unwrap_err();
        assert!(matches!(err, VectorStoreError::Consistency(_)));
        assert!(!mapping.validate());
    }

    #[test]
    fn missing_files_only_warn() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, "x").unwrap();

        let mut mapping = Mapping::default();
        mapping.insert(0, "h0", present.to_string_lossy());
        mapping.insert(1, "h1", dir.path().join("gone.txt").to_string_lossy());

        assert!(mapping.validate());
        assert_eq!(mapping.missing_files().len(), 1);
    }

    #[test]
    fn retain_below_drops_dangling_ids() {
        let mut mapping = sample();
        mapping.insert(2, "h2", "/docs/c.txt");
        assert_eq!(mapping.retain_below(1), vec![1, 2]);
        assert_eq!(mapping, {
            let mut m = Mapping::default();
            m.insert(0, "h0", "/docs/a.txt");
            m
        });
    }

    #[test]
    fn close_truncated_json_cases() {
        assert_eq!(
            close_truncated_json(r#"{"a": {"b": "c"},"#).as_deref(),
            Some(r#"{"a": {"b": "c"}}"#)
        );
        assert_eq!(close_truncated_json(r#"{"a": [1, 2"#).as_deref(), Some(r#"{"a": [1, 2]}"#));
        assert_eq!(close_truncated_json(r#"{"a": "/docs/ha"#), None);
        assert_eq!(close_truncated_json(r#"{"a": 1}"#), None);
        assert_eq!(close_truncated_json(r#"{"a": 1]"#), None);
    }

    #[tokio::test]
    async fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = MappingStore::new(dir.path().join("mapping.json"), fast_policy());
        assert_eq!(store.load().await.unwrap(), Mapping::default());

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn truncated_file_is_repaired_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(
            &path,
            r#"{"doc_id_map": {"0": "h0"}, "path_map": {"h0": "/docs/a.txt""#,
        )
        .unwrap();

        let store = MappingStore::new(&path, fast_policy());
        let mut expected = Mapping::default();
        expected.insert(0, "h0", "/docs/a.txt");
        assert_eq!(store.load().await.unwrap(), expected);

        let on_disk: Mapping = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, expected);
    }

    #[tokio::test]
    async fn unrepairable_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        let garbage = r#"{"doc_id_map": {"0": "h0", "1": "h1"}, "path_map": {"h0": "/docs/a.txt"}}"#;
        std::fs::write(&path, garbage).unwrap();

        let store = MappingStore::new(&path, fast_policy());
        assert_eq!(store.load().await.unwrap(), Mapping::default());
        assert!(!path.exists());
        let aside = PersistPaths::new(&path).quarantine();
        assert_eq!(std::fs::read_to_string(aside).unwrap(), garbage);
    }

    #[tokio::test]
    async fn invalid_utf8_path_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        let mut raw = br#"{"doc_id_map":{"0":"h0"},"path_map":{"h0":"/d/"#.to_vec();
        raw.push(0xff);
        raw.extend_from_slice(br#".txt"}}"#);
        std::fs::write(&path, &raw).unwrap();

        let store = MappingStore::new(&path, fast_policy());
        assert_eq!(store.load().await.unwrap(), Mapping::default());
        assert!(!path.exists());
        assert_eq!(std::fs::read(PersistPaths::new(&path).quarantine()).unwrap(), raw);
    }

    #[tokio::test]
    async fn crash_between_tmp_write_and_rename_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        MappingStore::new(&path, fast_policy()).save(&sample()).await.unwrap();

        let paths = PersistPaths::new(&path);
        std::fs::write(paths.tmp(), r#"{"doc_id_map": {"0": "h0", "2""#).unwrap();

        let store = MappingStore::new(&path, fast_policy());
        assert_eq!(store.load().await.unwrap(), sample());

        let mut next = sample();
        next.insert(2, "h2", "/docs/c.txt");
        store.save(&next).await.unwrap();
        assert!(!paths.tmp().exists());
        assert_eq!(MappingStore::new(&path, fast_policy()).load().await.unwrap(), next);
    }

    #[tokio::test]
    async fn quarantine_waits_out_a_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, r#"{"doc_id_map": {"0": "h0"}, "path_map": {}}"#).unwrap();

        let paths = PersistPaths::new(&path);
        let reader = FileLock::acquire(&paths.lock(), LockMode::Shared, Duration::from_millis(50)).unwrap();
        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            drop(reader);
        });

        let policy = LockPolicy {
            attempts: 10,
            retry_delay: Duration::from_millis(20),
            ..fast_policy()
        };
        let store = MappingStore::new(&path, policy);
        assert_eq!(store.load().await.unwrap(), Mapping::default());
        assert!(paths.quarantine().exists());
        release.join().unwrap();
    }
}
