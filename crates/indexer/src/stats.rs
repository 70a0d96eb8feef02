use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const REASON_EMPTY_CONTENT: &str = "empty_content";
pub const REASON_EXISTS: &str = "exists";

/// Terminal state of one document's ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    Skipped,
    Error,
}

/// Result of ingesting a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub file: PathBuf,
    pub status: IngestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IngestOutcome {
    pub(crate) fn success(file: &Path, hash: String, doc_id: u64) -> Self {
        Self {
            file: file.to_path_buf(),
            status: IngestStatus::Success,
            hash: Some(hash),
            doc_id: Some(doc_id),
            reason: None,
        }
    }

    pub(crate) fn skipped(file: &Path, reason: &str, hash: Option<String>) -> Self {
        Self {
            file: file.to_path_buf(),
            status: IngestStatus::Skipped,
            hash,
            doc_id: None,
            reason: Some(reason.to_string()),
        }
    }

    pub(crate) fn error(file: &Path, reason: String) -> Self {
        Self {
            file: file.to_path_buf(),
            status: IngestStatus::Error,
            hash: None,
            doc_id: None,
            reason: Some(reason),
        }
    }
}

/// Statistics about a directory ingestion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Number of files ingested as new documents
    pub succeeded: usize,

    /// Files skipped as empty or already indexed
    pub skipped: usize,

    /// Files that failed
    pub errors: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Per-file results in processing order
    pub files: Vec<IngestOutcome>,
}

impl IngestReport {
    pub fn record(&mut self, outcome: IngestOutcome) {
        match outcome.status {
            IngestStatus::Success => self.succeeded += 1,
            IngestStatus::Skipped => self.skipped += 1,
            IngestStatus::Error => self.errors += 1,
        }
        self.files.push(outcome);
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.files.len()
    }
}
