use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};

/// Splits documents into overlapping whitespace-token windows
#[derive(Debug, Clone, Copy, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    /// Create a new chunker, rejecting invalid configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config })
    }

    /// Chunk text using the configured window and overlap
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        windows(text, self.config.window_tokens, self.config.step())
    }
}

/// Chunk `text` into windows of `window` tokens sharing `overlap` tokens.
///
/// Text of at most `window` tokens comes back as a single chunk. Windows
/// advance by `max(window - overlap, 1)` and stop at the first window that
/// reaches the end of the token stream, so the final chunk may be shorter
/// than `window` but never repeats a span already emitted.
pub fn chunk_text(text: &str, window: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = TextChunker::new(ChunkerConfig {
        window_tokens: window,
        overlap_tokens: overlap,
    })?;
    Ok(chunker.chunk(text))
}

fn windows(text: &str, window: usize, step: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    if tokens.len() <= window {
        return vec![text.trim().to_string()];
    }

    let mut chunks = Vec::with_capacity(tokens.len().div_ceil(step));
    let mut start = 0usize;
    loop {
        let end = (start + window).min(tokens.len());
        chunks.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += step;
    }

    log::debug!(
        "Chunked {} tokens into {} windows (window={window}, step={step})",
        tokens.len(),
        chunks.len()
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uneven_input_has_no_dangling_window() {
        let chunks = chunk_text("a b c d e f g", 4, 2).unwrap();
        assert_eq!(chunks, vec!["a b c d", "c d e f", "e f g"]);
    }

    #[test]
    fn even_input_ends_on_full_window() {
        let chunks = chunk_text("a b c d e f", 4, 2).unwrap();
        assert_eq!(chunks, vec!["a b c d", "c d e f"]);
    }

    #[test]
    fn short_text_is_single_chunk_verbatim() {
        let chunker = TextChunker::new(ChunkerConfig::with_window(8)).unwrap();
        assert_eq!(chunker.chunk("  hello \n world  "), vec!["hello \n world"]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let chunker = TextChunker::default();
        assert!(chunker.chunk(" \t\n ").is_empty());
    }

    #[test]
    fn window_of_one_emits_every_token() {
        let chunks = chunk_text("x y z", 1, 0).unwrap();
        assert_eq!(chunks, vec!["x", "y", "z"]);
    }

    #[test]
    fn consecutive_windows_overlap_by_half() {
        let text = (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, 6, 3).unwrap();
        for pair in chunks.windows(2) {
            let left: Vec<&str> = pair[0].split(' ').collect();
            let right: Vec<&str> = pair[1].split(' ').collect();
            assert_eq!(left[3..], right[..3]);
        }
        assert!(chunks.last().unwrap().ends_with("19"));
    }

    #[test]
    fn invalid_window_is_rejected() {
        assert!(chunk_text("a b", 0, 0).is_err());
    }
}
