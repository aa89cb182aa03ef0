//! Embedding-level near-duplicate filtering.

use tracing::debug;

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude, so a zero vector is never
/// a duplicate of anything. Vectors of different length are compared over
/// their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Keeps the subsequence of items whose embeddings are pairwise distinct.
///
/// The first item is always kept. Every later item is compared against each
/// kept item and dropped if any similarity exceeds the threshold. Cost is
/// quadratic in the kept count, which is fine for the tens of chunks a single
/// page produces.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::SimilarityDeduplicator;
///
/// let dedup = SimilarityDeduplicator::new(0.95);
/// let kept = dedup.retain_distinct(vec![("a", vec![1.0, 0.0]), ("b", vec![1.0, 0.01])]);
/// assert_eq!(kept.len(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityDeduplicator {
    threshold: f32,
}

impl Default for SimilarityDeduplicator {
    fn default() -> Self {
        Self { threshold: 0.95 }
    }
}

impl SimilarityDeduplicator {
    /// Create a deduplicator that drops items more similar than `threshold`.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// The similarity above which an item counts as a duplicate.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Filter `(item, embedding)` pairs, preserving order.
    ///
    /// Kept pairs are returned with their embeddings so callers can reuse them.
    pub fn retain_distinct<T>(&self, items: Vec<(T, Vec<f32>)>) -> Vec<(T, Vec<f32>)> {
        let total = items.len();
        let mut kept: Vec<(T, Vec<f32>)> = Vec::with_capacity(total);

        for (item, embedding) in items {
            let duplicate = kept
                .iter()
                .any(|(_, seen)| cosine_similarity(&embedding, seen) > self.threshold);
            if !duplicate {
                kept.push((item, embedding));
            }
        }

        debug!(total, kept = kept.len(), threshold = self.threshold, "similarity dedup");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn first_item_is_always_kept() {
        let dedup = SimilarityDeduplicator::new(0.95);
        let kept = dedup.retain_distinct(vec![("only", vec![0.0, 0.0])]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0, "only");
    }

    #[test]
    fn zero_vectors_are_never_duplicates() {
        let dedup = SimilarityDeduplicator::new(0.95);
        let kept = dedup.retain_distinct(vec![("a", vec![0.0; 3]), ("b", vec![0.0; 3])]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn similarity_equal_to_threshold_is_kept() {
        let dedup = SimilarityDeduplicator::new(1.0);
        let kept = dedup.retain_distinct(vec![("a", vec![1.0, 0.0]), ("b", vec![1.0, 0.0])]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn near_duplicates_are_dropped_in_order() {
        let dedup = SimilarityDeduplicator::new(0.95);
        let kept = dedup.retain_distinct(vec![
            ("a", vec![1.0, 0.0]),
            ("b", vec![0.0, 1.0]),
            ("a2", vec![0.99, 0.01]),
            ("c", vec![0.7, 0.7]),
        ]);
        let names: Vec<_> = kept.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
