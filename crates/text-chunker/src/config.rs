use serde::{Deserialize, Serialize};

/// Configuration for document windowing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Window size in whitespace tokens
    pub window_tokens: usize,

    /// Tokens shared between neighbouring windows
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::with_window(256)
    }
}

impl ChunkerConfig {
    /// Window of `window_tokens` advancing by half a window (at least one token)
    #[must_use]
    pub const fn with_window(window_tokens: usize) -> Self {
        let half = window_tokens / 2;
        let step = if half == 0 { 1 } else { half };
        Self {
            window_tokens,
            overlap_tokens: window_tokens.saturating_sub(step),
        }
    }

    /// Distance between the starts of two neighbouring windows (never zero)
    #[must_use]
    pub fn step(&self) -> usize {
        self.window_tokens.saturating_sub(self.overlap_tokens).max(1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.window_tokens == 0 {
            return Err("window_tokens must be > 0".to_string());
        }

        if self.window_tokens > 1 && self.overlap_tokens >= self.window_tokens {
            return Err(format!(
                "overlap_tokens ({}) must be smaller than window_tokens ({})",
                self.overlap_tokens, self.window_tokens
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_overlap_step() {
        assert_eq!(ChunkerConfig::with_window(4).step(), 2);
        assert_eq!(ChunkerConfig::with_window(5).step(), 2);
        assert_eq!(ChunkerConfig::with_window(5).overlap_tokens, 3);
        assert_eq!(ChunkerConfig::with_window(1).step(), 1);
    }

    #[test]
    fn rejects_zero_window_and_full_overlap() {
        assert!(ChunkerConfig::with_window(0).validate().is_err());
        let config = ChunkerConfig {
            window_tokens: 4,
            overlap_tokens: 4,
        };
        assert!(config.validate().is_err());
        assert!(ChunkerConfig::default().validate().is_ok());
    }
}
