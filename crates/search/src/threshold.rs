use crate::query::QueryHit;

/// Keep hits whose similarity is at least `threshold`, preserving order.
///
/// Distances are inner products of normalized vectors, so higher is closer.
#[must_use]
pub fn apply_threshold(mut hits: Vec<QueryHit>, threshold: Option<f32>) -> Vec<QueryHit> {
    if let Some(threshold) = threshold {
        let before = hits.len();
        hits.retain(|hit| hit.distance >= threshold);
        if hits.len() < before {
            log::debug!(
                "Threshold {threshold} dropped {} of {before} hits",
                before - hits.len()
            );
        }
    }
    hits
}
