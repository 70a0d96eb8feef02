use crate::config::Settings;
use crate::content_hash::content_hash;
use crate::error::{IndexerError, Result};
use crate::extract::{PlainTextExtractor, TextExtractor};
use crate::index_state::{CommitOutcome, IndexState};
use crate::stats::{IngestOutcome, IngestReport, REASON_EMPTY_CONTENT, REASON_EXISTS};
use cognisync_text_chunker::{mean_pool, TextChunker};
use cognisync_vector_store::Embedder;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Last state a document reached on its way into the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Extracted,
    Deduplicated,
    Embedded,
    Indexed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Deduplicated => "deduplicated",
            Self::Embedded => "embedded",
            Self::Indexed => "indexed",
        })
    }
}

/// Extract, deduplicate, embed and record documents.
pub struct IngestPipeline {
    state: Arc<IndexState>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    chunker: TextChunker,
    excluded_dir: Option<PathBuf>,
}

impl IngestPipeline {
    pub fn new(
        state: Arc<IndexState>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            state,
            embedder,
            extractor,
            chunker,
            excluded_dir: None,
        }
    }

    /// Pipeline over the stores in `settings.data_dir`, reading files with
    /// [`PlainTextExtractor`]. The data directory itself is never ingested.
    pub fn from_settings(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let state = Arc::new(IndexState::new(settings, Arc::clone(&embedder)));
        let extractor = Arc::new(PlainTextExtractor::new(settings.max_document_bytes));
        let chunker = TextChunker::new(settings.chunker_config())?;
        Ok(Self::new(state, embedder, extractor, chunker).with_excluded_dir(&settings.data_dir))
    }

    /// Skip everything under `dir` when walking directories.
    #[must_use]
    pub fn with_excluded_dir(mut self, dir: &Path) -> Self {
        self.excluded_dir = Some(dir.to_path_buf());
        self
    }

    #[must_use]
    pub fn state(&self) -> &Arc<IndexState> {
        &self.state
    }

    #[must_use]
    pub fn extractor(&self) -> &Arc<dyn TextExtractor> {
        &self.extractor
    }

    /// Ingest one file. Failures become an `Error` outcome instead of
    /// propagating, so callers can keep going.
    pub async fn ingest_file(&self, path: &Path) -> IngestOutcome {
        let mut stage = IngestStage::Received;
        match self.process(path, &mut stage).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("Ingestion of {} failed after {stage}: {err}", path.display());
                IngestOutcome::error(path, err.to_string())
            }
        }
    }

    /// Ingest every file below `dir`, once each.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let is_dir = tokio::fs::metadata(dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(IndexerError::InvalidPath(format!(
                "not a directory: {}",
                dir.display()
            )));
        }

        let root = tokio::fs::canonicalize(dir).await?;
        let excluded = match &self.excluded_dir {
            Some(excluded) => tokio::fs::canonicalize(excluded).await.ok(),
            None => None,
        };
        let files = tokio::task::spawn_blocking(move || collect_files(&root, excluded.as_deref()))
            .await
            .map_err(|err| IndexerError::Other(format!("join directory walk: {err}")))?;
        log::info!("Found {} files under {}", files.len(), dir.display());

        let mut report = IngestReport::default();
        for file in files {
            report.record(self.ingest_file(&file).await);
        }
        report.time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        log::info!(
            "Ingested {}: {} new, {} skipped, {} errors in {}ms",
            dir.display(),
            report.succeeded,
            report.skipped,
            report.errors,
            report.time_ms
        );
        Ok(report)
    }

    async fn process(&self, path: &Path, stage: &mut IngestStage) -> Result<IngestOutcome> {
        let text = self.extractor.extract(path).await?;
        *stage = IngestStage::Extracted;

        let Some(hash) = content_hash(&text) else {
            log::info!("Skipping {}: empty content", path.display());
            return Ok(IngestOutcome::skipped(path, REASON_EMPTY_CONTENT, None));
        };
        if let Some(existing) = self.state.find_existing(&hash).await? {
            log::info!(
                "Skipping {}: content {hash} already indexed from {existing}",
                path.display()
            );
            return Ok(IngestOutcome::skipped(path, REASON_EXISTS, Some(hash.into_string())));
        }
        *stage = IngestStage::Deduplicated;

        let vector = self.embed_document(&text).await?;
        *stage = IngestStage::Embedded;

        let source = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        match self.state.commit_document(&hash, &source, &vector).await? {
            CommitOutcome::Exists => {
                log::info!("Skipping {}: content {hash} indexed concurrently", path.display());
                Ok(IngestOutcome::skipped(path, REASON_EXISTS, Some(hash.into_string())))
            }
            CommitOutcome::Added { doc_id } => {
                *stage = IngestStage::Indexed;
                log::info!("Indexed {} as doc_id {doc_id} ({hash})", path.display());
                Ok(IngestOutcome::success(path, hash.into_string(), doc_id))
            }
        }
    }

    /// Chunk, embed each chunk and pool into one normalized vector.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        let chunks = self.chunker.chunk(text);
        log::debug!("Embedding {} chunks", chunks.len());
        let vectors = self.embedder.embed_batch(&chunks).await?;
        Ok(mean_pool(&vectors)?)
    }
}

fn collect_files(root: &Path, excluded: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| excluded.map_or(true, |dir| !entry.path().starts_with(dir)));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => log::warn!("Failed to read entry: {err}"),
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_skips_excluded_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = dir.path().join("search_index");
        std::fs::create_dir_all(data.join("nested")).unwrap();
        std::fs::write(data.join("mapping.json"), "{}").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("a.txt"), "a").unwrap();

        let files = collect_files(dir.path(), Some(&data));
        assert_eq!(
            files,
            vec![dir.path().join("b.txt"), dir.path().join("sub").join("a.txt")]
        );
    }

    #[test]
    fn stage_names() {
        assert_eq!(IngestStage::Deduplicated.to_string(), "deduplicated");
    }
}
