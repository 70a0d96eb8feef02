use crate::error::{Result, VectorStoreError};
use std::cmp::Ordering;
use std::io::Read;
use std::path::Path;

pub const INDEX_MAGIC: &[u8; 4] = b"CSFX";
pub const HEADER_LEN: usize = 16;

/// Exhaustive inner-product index over densely packed vectors.
///
/// Vectors are append-only: the position a vector lands at is its doc_id and
/// is never reassigned. On L2-normalized inputs the inner product is the
/// cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

/// Fixed-size prefix of a serialized index.
///
/// `count` is kept signed so a corrupted header reporting a negative number of
/// vectors can be told apart from a legitimately empty index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub dimension: usize,
    pub count: i64,
}

impl IndexHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(VectorStoreError::Corruption(format!(
                "index header truncated ({} of {HEADER_LEN} bytes)",
                bytes.len()
            )));
        }
        if &bytes[0..4] != INDEX_MAGIC {
            return Err(VectorStoreError::Corruption("bad index magic".into()));
        }
        let dimension = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[8..16]);
        Ok(Self {
            dimension,
            count: i64::from_le_bytes(count),
        })
    }

    /// Read just the header of an on-disk index.
    pub fn read_from_path(path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = [0u8; HEADER_LEN];
        file.read_exact(&mut buf).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                VectorStoreError::Corruption(format!("index header truncated: {}", path.display()))
            } else {
                err.into()
            }
        })?;
        Self::parse(&buf)
    }
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::Validation(
                "index dimension must be > 0".into(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return its doc_id
    pub fn add(&mut self, vector: &[f32]) -> Result<u64> {
        self.check_dimension(vector)?;
        let doc_id = self.len() as u64;
        self.data.extend_from_slice(vector);
        Ok(doc_id)
    }

    #[must_use]
    pub fn vector(&self, doc_id: u64) -> Option<&[f32]> {
        let start = usize::try_from(doc_id).ok()?.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Top-`k` doc_ids by inner product, best first (ties broken by doc_id)
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scores: Vec<(u64, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, vector)| {
                let score: f32 = vector.iter().zip(query).map(|(a, b)| a * b).sum();
                (id as u64, score)
            })
            .collect();

        scores.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scores.truncate(k);
        Ok(scores)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            VectorStoreError::Validation(format!("dimension {} too large", self.dimension))
        })?;
        let count = i64::try_from(self.len())
            .map_err(|_| VectorStoreError::Validation("vector count overflow".into()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&dimension.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = IndexHeader::parse(bytes)?;
        if header.count < 0 {
            return Err(VectorStoreError::Corruption(format!(
                "invalid index structure: vector count {}",
                header.count
            )));
        }
        if header.dimension == 0 {
            return Err(VectorStoreError::Corruption("index dimension is zero".into()));
        }

        let payload = &bytes[HEADER_LEN..];
        let expected = usize::try_from(header.count)
            .ok()
            .and_then(|count| count.checked_mul(header.dimension))
            .and_then(|values| values.checked_mul(4));
        if expected != Some(payload.len()) {
            return Err(VectorStoreError::Corruption(format!(
                "index payload is {} bytes, header promises {} vectors of {} dims",
                payload.len(),
                header.count,
                header.dimension
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self {
            dimension: header.dimension,
            data,
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(3).unwrap();
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.9, 0.1, 0.0]).unwrap();
        index.add(&[0.0, 1.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn doc_ids_are_append_positions() {
        let mut index = FlatIndex::new(2).unwrap();
        assert_eq!(index.add(&[1.0, 0.0]).unwrap(), 0);
        assert_eq!(index.add(&[0.0, 1.0]).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1), Some(&[0.0, 1.0][..]));
        assert_eq!(index.vector(2), None);
    }

    #[test]
    fn test_add_and_search() {
        let index = sample();
        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0, 1);

        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3).unwrap();
        assert!(index.add(&[1.0, 0.0]).is_err());
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn bytes_preserve_vectors() {
        let index = sample();
        let restored = FlatIndex::from_bytes(&index.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, index);
    }

    #[test]
    fn negative_count_is_corruption() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[8..16].copy_from_slice(&(-1i64).to_le_bytes());
        let err = FlatIndex::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, VectorStoreError::Corruption(_)), "{err}");
    }

    #[test]
    fn truncated_payload_is_corruption() {
        let bytes = sample().to_bytes().unwrap();
        let err = FlatIndex::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, VectorStoreError::Corruption(_)));
        let err = FlatIndex::from_bytes(b"CSF").unwrap_err();
        assert!(matches!(err, VectorStoreError::Corruption(_)));
    }
}
