use crate::error::{Result, SearchError};
use crate::threshold::apply_threshold;
use cognisync_indexer::{IndexState, PlainTextExtractor, Settings, TextExtractor};
use cognisync_text_chunker::l2_normalize;
use cognisync_vector_store::Embedder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// One resolved search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub doc_id: u64,
    pub hash: String,
    pub path: PathBuf,
    /// Inner product with the query; higher is closer
    pub distance: f32,
}

/// Embed a question, search the index and resolve hits to source files.
pub struct QueryPipeline {
    state: Arc<IndexState>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
}

impl QueryPipeline {
    pub fn new(
        state: Arc<IndexState>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            state,
            embedder,
            extractor,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings, embedder: Arc<dyn Embedder>) -> Self {
        let state = Arc::new(IndexState::new(settings, Arc::clone(&embedder)));
        let extractor = Arc::new(PlainTextExtractor::new(settings.max_document_bytes));
        Self::new(state, embedder, extractor)
    }

    #[must_use]
    pub fn state(&self) -> &Arc<IndexState> {
        &self.state
    }

    /// Up to `k` hits, best first, with unresolvable or vanished sources
    /// dropped and `threshold` applied.
    pub async fn query(&self, text: &str, k: usize, threshold: Option<f32>) -> Result<Vec<QueryHit>> {
        if text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.state.snapshot().await?;
        if snapshot.index.is_empty() {
            log::debug!("Index is empty, nothing to search");
            return Ok(Vec::new());
        }

        let mut vector = self.embedder.embed(text).await?;
        l2_normalize(&mut vector);
        let candidates = snapshot.index.search(&vector, k)?;
        log::debug!("Search: query='{text}', k={k}, candidates={}", candidates.len());

        let mut hits = Vec::with_capacity(candidates.len());
        for (doc_id, distance) in candidates {
            let Some((hash, path)) = snapshot.resolve(doc_id) else {
                log::warn!("doc_id {doc_id} has no mapping entry, dropping it");
                continue;
            };
            let path = PathBuf::from(path);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                log::warn!(
                    "Source {} of doc_id {doc_id} no longer exists, dropping it",
                    path.display()
                );
                continue;
            }
            hits.push(QueryHit {
                doc_id,
                hash: hash.to_string(),
                path,
                distance,
            });
        }

        Ok(apply_threshold(hits, threshold))
    }

    /// Source text of `hits`, newline separated, for answer generation.
    /// Sources that can no longer be read are skipped.
    pub async fn gather_context(&self, hits: &[QueryHit]) -> String {
        let mut parts = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.extractor.extract(&hit.path).await {
                Ok(text) => parts.push(text),
                Err(err) => log::warn!("Skipping context from {}: {err}", hit.path.display()),
            }
        }
        parts.join("\n")
    }
}
