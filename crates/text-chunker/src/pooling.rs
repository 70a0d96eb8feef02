use crate::error::{ChunkerError, Result};

/// Element-wise mean of the chunk vectors, L2-normalized.
///
/// A single chunk yields that chunk's normalized vector.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors.first().ok_or(ChunkerError::NoVectors)?;
    let dimension = first.len();

    let mut sum = vec![0.0f32; dimension];
    for vector in vectors {
        if vector.len() != dimension {
            return Err(ChunkerError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let count = vectors.len() as f32;
    for value in &mut sum {
        *value /= count;
    }

    l2_normalize(&mut sum);
    Ok(sum)
}

/// Scale `vec` to unit length; the zero vector is left untouched.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn single_chunk_is_normalized_copy() {
        let pooled = mean_pool(&[vec![3.0, 4.0]]).unwrap();
        assert!((pooled[0] - 0.6).abs() < 1e-6);
        assert!((pooled[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn mean_then_normalize() {
        let pooled = mean_pool(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((pooled[0] - expected).abs() < 1e-6);
        assert!((pooled[1] - expected).abs() < 1e-6);
        assert!((norm(&pooled) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_and_mismatched_inputs_fail() {
        assert!(matches!(mean_pool(&[]), Err(ChunkerError::NoVectors)));
        assert!(matches!(
            mean_pool(&[vec![1.0, 0.0], vec![1.0]]),
            Err(ChunkerError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn zero_vector_stays_zero() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
