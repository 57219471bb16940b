//! Content fingerprinting for deduplicated storage.
//!
//! Archives are deduplicated by a SHA-256 digest of their payload: the
//! file bytes for physical uploads, the UTF-8 encoded string for external
//! URL references. The digest doubles as the canonical on-disk file name,
//! so identical content always resolves to the same storage slot.

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of a byte payload.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the digest of an external URL reference.
///
/// Same digest as [`hash_bytes`] over the UTF-8 bytes of the string, so a
/// URL saved twice resolves to the same archive slot.
pub fn hash_url(url: &str) -> String {
    hash_bytes(url.as_bytes())
}

/// Incremental SHA-256 over a payload fed in chunks.
///
/// File intake hashes the buffered payload chunk-by-chunk while writing
/// it to the temp file, so the bytes are walked once for both the digest
/// and the write.
#[derive(Default)]
pub struct Sha256Stream {
    inner: Sha256,
}

impl Sha256Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Consume the hasher and return the lowercase hex digest.
    pub fn finalize(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Derive a fresh hash for a physical copy of an existing archive.
///
/// Mixes the original digest with the current timestamp and a random salt
/// so the copy can never be deduplicated against the original or against
/// other copies, even though the underlying bytes are identical.
pub fn derived_copy_hash(original_hex: &str, now: DateTime<Utc>) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hasher = Sha256::new();
    hasher.update(original_hex.as_bytes());
    hasher.update(now.timestamp_millis().to_be_bytes());
    hasher.update(salt);
    hex::encode(hasher.finalize())
}
