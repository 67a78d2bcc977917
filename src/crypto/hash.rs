/// SHA-256 hashing utilities.
///
/// SHA-256 is used throughout the system for:
/// - Identity fingerprints (over concatenated public keys)
/// - Grant payload digests before ECDSA signing
/// - Share-time safety codes
use sha2::{Digest, Sha256};

/// Hash arbitrary data with SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash the concatenation of two byte strings with SHA-256.
pub fn sha256_pair(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}
