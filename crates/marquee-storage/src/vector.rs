//! Brute-force cosine KNN over vectors stored as little-endian f32 blobs.
//!
//! Every candidate that survived the structured filters is scored, so the
//! result is exact. Fine for a catalog of tens of thousands of documents.

use std::cmp::Ordering;

use marquee_core::error::MarqueeError;

/// Encode a vector as a little-endian f32 blob.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a blob written by [`encode`].
pub fn decode(blob: &[u8]) -> Result<Vec<f32>, MarqueeError> {
    if blob.len() % 4 != 0 {
        return Err(MarqueeError::StoreUnavailable(format!(
            "Corrupt vector blob of {} bytes",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance, `1 - similarity`. Lower is closer.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// Keep the `k` candidates closest to `query`, ordered by ascending distance
/// with ties broken by key.
pub fn nearest<T>(
    query: &[f32],
    candidates: Vec<(String, Vec<f32>, T)>,
    k: usize,
) -> Vec<(f64, T)> {
    let mut scored: Vec<(f64, String, T)> = candidates
        .into_iter()
        .map(|(key, vector, item)| (cosine_distance(query, &vector), key, item))
        .collect();

    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    scored.truncate(k);

    scored.into_iter().map(|(d, _, item)| (d, item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.0];
        let blob = encode(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode(&blob).unwrap(), v);
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        assert!(decode(&[0u8, 1, 2]).is_err());
    }

    #[test]
    fn test_cosine_distance_bounds() {
        let a = [1.0f32, 0.0];
        assert!(cosine_distance(&a, &[1.0, 0.0]).abs() < 1e-9);
        assert!((cosine_distance(&a, &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&a, &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_zero_or_mismatched() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_nearest_orders_by_distance_then_key() {
        let query = [1.0f32, 0.0];
        let candidates = vec![
            ("c".to_string(), vec![0.0, 1.0], "far"),
            ("b".to_string(), vec![1.0, 0.0], "exact-b"),
            ("a".to_string(), vec![2.0, 0.0], "exact-a"),
            ("d".to_string(), vec![1.0, 1.0], "mid"),
        ];

        let hits = nearest(&query, candidates, 3);
        let items: Vec<&str> = hits.iter().map(|(_, item)| *item).collect();
        assert_eq!(items, vec!["exact-a", "exact-b", "mid"]);
        assert!(hits.windows(2).all(|w| w[0].0 <= w[1].0));
    }
}
