//! Embedding vector codec and cosine math.
//!
//! Vectors are persisted as little-endian `f32` BLOBs. Similarity throughout
//! the retrieval path is `1 - cosine_distance`.

/// Encode an embedding as a little-endian f32 byte blob.
pub fn encode(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 byte blob. Trailing partial floats (a corrupt
/// row) are dropped.
pub fn decode(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine distance between two vectors of the same dimension.
///
/// Returns `None` on a dimension mismatch: the caller passed a vector from
/// a different embedding-model family, which is a caller error, not
/// something to paper over. A zero-norm operand yields the maximum
/// distance of 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(1.0);
    }
    Some(1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()))
}
