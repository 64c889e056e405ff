//! Content hashing for cross-source dedup and deterministic ids.

use sha2::{Digest, Sha256};

/// Full SHA-256 hex digest of raw content. The knowledge store keys
/// duplicate detection on this value.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic synthesized message id: truncated SHA-256 hex over the
/// identifying parts, joined with a separator that cannot appear ambiguously.
///
/// Used where the source provides no native id (export transcripts), so
/// re-importing the same file yields the same ids and the idempotent store
/// collapses the duplicates.
pub fn synthetic_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\x1f");
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())[..16].to_string()
}
