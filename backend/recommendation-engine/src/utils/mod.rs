// Utility functions for recommendation-engine

use std::cmp::Ordering;

/// Normalize a non-negative value by the column maximum; 0 when the maximum is 0
pub fn normalize_by_max(value: f64, max: f64) -> f64 {
    if max <= f64::EPSILON {
        0.0
    } else {
        (value / max).clamp(0.0, 1.0)
    }
}

/// Reciprocal rank value for a 0-indexed position
pub fn rank_score(rank: usize) -> f64 {
    1.0 / (rank as f64 + 1.0)
}

/// Descending order for scores; NaN sorts last
pub fn desc_score(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Cosine similarity of two equal-length vectors; 0 if either is all zeros
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_by_max() {
        assert!((normalize_by_max(5.0, 10.0) - 0.5).abs() < 0.001);
        assert!((normalize_by_max(10.0, 10.0) - 1.0).abs() < 0.001);
        assert_eq!(normalize_by_max(3.0, 0.0), 0.0);
    }

    #[test]
    fn test_rank_score() {
        assert_eq!(rank_score(0), 1.0);
        assert!((rank_score(2) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_desc_score_puts_nan_last() {
        let mut scores = vec![0.2, f64::NAN, 0.9, 0.5];
        scores.sort_by(|a, b| desc_score(*a, *b));
        assert_eq!(&scores[..3], &[0.9, 0.5, 0.2]);
        assert!(scores[3].is_nan());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
