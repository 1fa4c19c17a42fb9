//! Content hashing for change detection
//!
//! Hashes are taken over the literal source text, not the parsed record, so a
//! formatting-only edit still counts as a change.

use sha2::{Digest, Sha256};

/// SHA-256 of the raw record text as lowercase hex
pub fn content_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
