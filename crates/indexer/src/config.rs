use crate::error::{IndexerError, Result};
use cognisync_text_chunker::ChunkerConfig;
use cognisync_vector_store::LockPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "COGNISYNC_";
pub const INGEST_LOCK_FILE: &str = "ingest.lock";

/// Runtime settings, resolved from defaults, an optional TOML file and
/// `COGNISYNC_*` environment variables, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub index_file: String,
    pub mapping_file: String,
    pub index_read_lock_timeout_ms: u64,
    pub index_write_lock_timeout_ms: u64,
    pub mapping_read_lock_timeout_ms: u64,
    pub mapping_write_lock_timeout_ms: u64,
    pub lock_retry_attempts: u32,
    pub lock_retry_delay_ms: u64,
    pub chunk_window_tokens: usize,
    pub max_document_bytes: u64,
    pub similarity_threshold: Option<f32>,
    pub top_k: usize,
    pub embedding_dimension: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./search_index"),
            index_file: "vectors.idx".to_string(),
            mapping_file: "mapping.json".to_string(),
            index_read_lock_timeout_ms: 10_000,
            index_write_lock_timeout_ms: 15_000,
            mapping_read_lock_timeout_ms: 5_000,
            mapping_write_lock_timeout_ms: 10_000,
            lock_retry_attempts: 3,
            lock_retry_delay_ms: 2_000,
            chunk_window_tokens: 256,
            max_document_bytes: 16 * 1024 * 1024,
            similarity_threshold: None,
            top_k: 5,
            embedding_dimension: 384,
        }
    }
}

impl Settings {
    /// Defaults, overlaid by `config` (if given) and then by the process
    /// environment.
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let mut settings = match config {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        settings.apply_env_from(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            IndexerError::Config(format!("read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|err| IndexerError::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| IndexerError::Config(err.to_string()))
    }

    /// Override fields from `COGNISYNC_<FIELD>` variables found by `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |field: &str| {
            let key = format!("{ENV_PREFIX}{}", field.to_ascii_uppercase());
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("data_dir") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some((_, value)) = var("index_file") {
            self.index_file = value;
        }
        if let Some((_, value)) = var("mapping_file") {
            self.mapping_file = value;
        }
        set_parsed(&mut self.index_read_lock_timeout_ms, var("index_read_lock_timeout_ms"))?;
        set_parsed(&mut self.index_write_lock_timeout_ms, var("index_write_lock_timeout_ms"))?;
        set_parsed(&mut self.mapping_read_lock_timeout_ms, var("mapping_read_lock_timeout_ms"))?;
        set_parsed(&mut self.mapping_write_lock_timeout_ms, var("mapping_write_lock_timeout_ms"))?;
        set_parsed(&mut self.lock_retry_attempts, var("lock_retry_attempts"))?;
        set_parsed(&mut self.lock_retry_delay_ms, var("lock_retry_delay_ms"))?;
        set_parsed(&mut self.chunk_window_tokens, var("chunk_window_tokens"))?;
        set_parsed(&mut self.max_document_bytes, var("max_document_bytes"))?;
        set_parsed(&mut self.top_k, var("top_k"))?;
        set_parsed(&mut self.embedding_dimension, var("embedding_dimension"))?;
        if let Some((key, value)) = var("similarity_threshold") {
            self.similarity_threshold = if value.trim().is_empty() {
                None
            } else {
                Some(parse_value(&key, &value)?)
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_file.is_empty() || self.mapping_file.is_empty() {
            return Err(IndexerError::Config("store file names must not be empty".into()));
        }
        if self.index_file == self.mapping_file {
            return Err(IndexerError::Config(
                "index_file and mapping_file must differ".into(),
            ));
        }
        if self.lock_retry_attempts == 0 {
            return Err(IndexerError::Config("lock_retry_attempts must be >= 1".into()));
        }
        if self.top_k == 0 {
            return Err(IndexerError::Config("top_k must be >= 1".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(IndexerError::Config("embedding_dimension must be >= 1".into()));
        }
        if self.max_document_bytes == 0 {
            return Err(IndexerError::Config("max_document_bytes must be >= 1".into()));
        }
        if let Some(threshold) = self.similarity_threshold {
            if !threshold.is_finite() {
                return Err(IndexerError::Config("similarity_threshold must be finite".into()));
            }
        }
        self.chunker_config().validate().map_err(IndexerError::Config)
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file)
    }

    #[must_use]
    pub fn mapping_path(&self) -> PathBuf {
        self.data_dir.join(&self.mapping_file)
    }

    #[must_use]
    pub fn ingest_lock_path(&self) -> PathBuf {
        self.data_dir.join(INGEST_LOCK_FILE)
    }

    #[must_use]
    pub fn index_lock_policy(&self) -> LockPolicy {
        LockPolicy {
            read_timeout: Duration::from_millis(self.index_read_lock_timeout_ms),
            write_timeout: Duration::from_millis(self.index_write_lock_timeout_ms),
            attempts: self.lock_retry_attempts,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }

    #[must_use]
    pub fn mapping_lock_policy(&self) -> LockPolicy {
        LockPolicy {
            read_timeout: Duration::from_millis(self.mapping_read_lock_timeout_ms),
            write_timeout: Duration::from_millis(self.mapping_write_lock_timeout_ms),
            ..self.index_lock_policy()
        }
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig::with_window(self.chunk_window_tokens)
    }
}

fn set_parsed<T: FromStr>(slot: &mut T, var: Option<(String, String)>) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some((key, value)) = var {
        *slot = parse_value(&key, &value)?;
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| IndexerError::Config(format!("{key}={value:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.index_path(), PathBuf::from("./search_index/vectors.idx"));
        let index = settings.index_lock_policy();
        let mapping = settings.mapping_lock_policy();
        assert!(index.read_timeout < index.write_timeout);
        assert!(mapping.read_timeout < mapping.write_timeout);
        assert_eq!(mapping.attempts, 3);
    }

    #[test]
    fn toml_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            data_dir = "/var/lib/cognisync"
            chunk_window_tokens = 64
            similarity_threshold = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/cognisync"));
        assert_eq!(settings.chunk_window_tokens, 64);
        assert_eq!(settings.similarity_threshold, Some(0.25));
        assert_eq!(settings.top_k, 5);
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        assert!(Settings::from_toml_str("chunk_size = 3").is_err());
    }

    #[test]
    fn env_overrides_and_rejects_garbage() {
        let mut settings = Settings::default();
        settings
            .apply_env_from(env(&[
                ("COGNISYNC_TOP_K", "9"),
                ("COGNISYNC_LOCK_RETRY_DELAY_MS", "5"),
                ("COGNISYNC_SIMILARITY_THRESHOLD", "0.4"),
            ]))
            .unwrap();
        assert_eq!(settings.top_k, 9);
        assert_eq!(settings.lock_retry_delay_ms, 5);
        assert_eq!(settings.similarity_threshold, Some(0.4));

        let err = settings
            .apply_env_from(env(&[("COGNISYNC_TOP_K", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("COGNISYNC_TOP_K"), "{err}");
    }

    #[test]
    fn invalid_values_fail_validation() {
        let zero_window = Settings {
            chunk_window_tokens: 0,
            ..Settings::default()
        };
        assert!(zero_window.validate().is_err());

        let no_retries = Settings {
            lock_retry_attempts: 0,
            ..Settings::default()
        };
        assert!(no_retries.validate().is_err());
    }
}
