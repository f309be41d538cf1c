pub mod extract;
pub mod fact_store;
pub mod service;
pub mod store;
pub mod types;

/// Encode an f32 embedding as little-endian bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// L2 distance between unit vectors whose cosine similarity equals `threshold`.
pub fn cosine_threshold_to_l2(threshold: f64) -> f64 {
    (2.0 - 2.0 * threshold).max(0.0).sqrt()
}
