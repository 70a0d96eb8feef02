use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Bytes fed to the hasher at a time.
pub const HASH_BLOCK_BYTES: usize = 4096;

/// Lowercase hex SHA-256 of normalized document text; the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Hash of the NFC form of `text` without surrounding whitespace.
///
/// Returns `None` when nothing is left after trimming. The normalized text is
/// never materialized: composed characters are encoded into a fixed block
/// that is flushed to the hasher whenever it fills up.
#[must_use]
pub fn content_hash(text: &str) -> Option<ContentHash> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    let mut block = [0u8; HASH_BLOCK_BYTES];
    let mut filled = 0usize;
    let mut utf8 = [0u8; 4];

    for c in trimmed.nfc() {
        let encoded = c.encode_utf8(&mut utf8).as_bytes();
        if filled + encoded.len() > HASH_BLOCK_BYTES {
            hasher.update(&block[..filled]);
            filled = 0;
        }
        block[filled..filled + encoded.len()].copy_from_slice(encoded);
        filled += encoded.len();
    }
    hasher.update(&block[..filled]);

    Some(ContentHash(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_have_no_identity() {
        assert_eq!(content_hash(""), None);
        assert_eq!(content_hash(" \n\t "), None);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(content_hash("hello world"), content_hash("\n  hello world \t"));
        assert_ne!(content_hash("hello world"), content_hash("hello  world"));
    }

    #[test]
    fn canonically_equivalent_text_matches() {
        let composed = "caf\u{e9}";
        let decomposed = "cafe\u{301}";
        assert_eq!(content_hash(composed), content_hash(decomposed));
    }

    #[test]
    fn known_digest() {
        let hash = content_hash("abc").unwrap();
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn streaming_matches_single_pass_for_large_input() {
        let text = "\u{e9}t\u{e9} ".repeat(5000);
        let mut hasher = Sha256::new();
        hasher.update(text.trim().as_bytes());
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(content_hash(&text).unwrap().as_str(), expected);
    }
}
