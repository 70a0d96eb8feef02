use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use std::path::Path;

/// Extensions [`PlainTextExtractor`] accepts, compared case-insensitively.
pub const PLAIN_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "text", "csv", "log", "json", "html", "rst",
];

/// Turns a file on disk into plain text for hashing and embedding.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Whether this extractor handles `path` at all
    fn supports(&self, path: &Path) -> bool;

    async fn extract(&self, path: &Path) -> Result<String>;
}

/// Reads UTF-8 text formats straight from disk.
#[derive(Debug, Clone)]
pub struct PlainTextExtractor {
    max_bytes: u64,
}

impl PlainTextExtractor {
    #[must_use]
    pub const fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                PLAIN_TEXT_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    async fn extract(&self, path: &Path) -> Result<String> {
        if !self.supports(path) {
            return Err(IndexerError::extraction(path, "unsupported file type"));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| IndexerError::extraction(path, err.to_string()))?;
        if !metadata.is_file() {
            return Err(IndexerError::extraction(path, "not a regular file"));
        }
        if metadata.len() > self.max_bytes {
            return Err(IndexerError::extraction(
                path,
                format!("file is {} bytes, limit is {}", metadata.len(), self.max_bytes),
            ));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| IndexerError::extraction(path, err.to_string()))?;
        String::from_utf8(bytes)
            .map_err(|err| IndexerError::extraction(path, format!("not valid UTF-8: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_supported_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.MD");
        std::fs::write(&path, "# Title\nbody").unwrap();

        let extractor = PlainTextExtractor::new(1024);
        assert_eq!(extractor.extract(&path).await.unwrap(), "# Title\nbody");
    }

    #[tokio::test]
    async fn rejects_unsupported_corrupt_and_oversize() {
        let dir = TempDir::new().unwrap();
        let extractor = PlainTextExtractor::new(8);

        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, "%PDF").unwrap();
        let err = extractor.extract(&pdf).await.unwrap_err();
        assert!(err.to_string().contains("unsupported"), "{err}");

        let binary = dir.path().join("blob.txt");
        std::fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        let err = extractor.extract(&binary).await.unwrap_err();
        assert!(err.to_string().contains("UTF-8"), "{err}");

        let large = dir.path().join("large.txt");
        std::fs::write(&large, "0123456789").unwrap();
        let err = extractor.extract(&large).await.unwrap_err();
        assert!(err.to_string().contains("limit"), "{err}");
    }
}
