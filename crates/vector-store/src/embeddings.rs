use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use cognisync_text_chunker::l2_normalize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Text that is embedded to discover the vector width of a fresh index.
pub const PROBE_TEXT: &str = "sample text";

/// Capability to turn text into a fixed-length vector.
///
/// Implementations must be deterministic for a given model: the same text
/// always maps to the same vector, and every vector has the same length.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier of the underlying model
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Embed [`PROBE_TEXT`] and report the resulting vector width.
pub async fn probe_dimension(embedder: &dyn Embedder) -> Result<usize> {
    let vector = embedder.embed(PROBE_TEXT).await?;
    if vector.is_empty() {
        return Err(VectorStoreError::EmbeddingError(format!(
            "model '{}' returned an empty probe vector",
            embedder.model_id()
        )));
    }
    Ok(vector.len())
}

/// Deterministic feature-hashing embedder.
///
/// Every lowercase token is hashed into one signed bucket, then the vector is
/// L2-normalized. Texts sharing vocabulary land close together, which is enough
/// for tests and offline use without a model download.
pub struct StubEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::EmbeddingError(
                "stub embedder dimension must be > 0".into(),
            ));
        }
        Ok(Self {
            dimension,
            calls: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of texts embedded so far
    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_id(&self) -> &str {
        "stub"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(stub_embed(text, self.dimension))
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    for token in text.split_whitespace() {
        let token = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if token.is_empty() {
            continue;
        }
        let mut state = fnv1a_64(token.as_bytes());
        let bits = splitmix64(&mut state);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (bits % dimension as u64) as usize;
        vec[bucket] += if bits >> 63 == 0 { 1.0 } else { -1.0 };
    }
    l2_normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn stub_is_deterministic_and_normalized() {
        let embedder = StubEmbedder::new(64).unwrap();
        let a = embedder.embed("Rust ownership rules").await.unwrap();
        let b = embedder.embed("rust OWNERSHIP rules!").await.unwrap();
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
        assert_eq!(embedder.embed_calls(), 2);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let embedder = StubEmbedder::new(256).unwrap();
        let doc = embedder.embed("the borrow checker enforces ownership").await.unwrap();
        let near = embedder.embed("ownership and the borrow checker").await.unwrap();
        let far = embedder.embed("banana bread recipe with walnuts").await.unwrap();
        assert!(dot(&doc, &near) > dot(&doc, &far));
    }

    #[tokio::test]
    async fn probe_reports_width() {
        let embedder = StubEmbedder::new(12).unwrap();
        assert_eq!(probe_dimension(&embedder).await.unwrap(), 12);
        assert!(StubEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = StubEmbedder::new(16).unwrap();
        let texts = vec!["hello".to_string(), "world".to_string()];
        let out = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(out[0], stub_embed("hello", 16));
        assert_eq!(out[1], stub_embed("world", 16));
    }
}
