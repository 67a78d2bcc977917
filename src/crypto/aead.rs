/// AES-256-GCM AEAD encryption.
///
/// Both the sealed file body and each wrapped file encryption key use the
/// same combined framing: nonce(12) || ciphertext || tag(16). The 12-byte
/// nonce is drawn fresh from the OS CSPRNG for every seal.
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use crate::crypto::sensitive::Secret32;
use crate::error::{Result, VaultError};

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

/// Generate a random 12-byte nonce for AES-256-GCM.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Seal plaintext with AES-256-GCM under a fresh random nonce.
///
/// Returns the combined form nonce || ciphertext || tag.
pub fn seal(key: &Secret32, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose()));

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Open a combined nonce || ciphertext || tag buffer.
///
/// Any authentication failure (wrong key, tampered bytes) is reported as
/// `DecryptionFailed`.
pub fn open(key: &Secret32, combined: &[u8]) -> Result<Vec<u8>> {
    if combined.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::DecryptionFailed(format!(
            "sealed buffer too short: {} bytes",
            combined.len()
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose()));
    let nonce = Nonce::from_slice(&combined[..NONCE_LEN]);

    cipher
        .decrypt(nonce, &combined[NONCE_LEN..])
        .map_err(|e| VaultError::DecryptionFailed(e.to_string()))
}

/// Seal with a caller-supplied nonce (used when the container stores the
/// nonce in its own header field). Returns ciphertext || tag only.
pub fn seal_with_nonce(
    key: &Secret32,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose()));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| VaultError::Encryption(e.to_string()))
}

/// Open a ciphertext || tag buffer with a caller-supplied nonce.
pub fn open_with_nonce(
    key: &Secret32,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| VaultError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = Secret32::random();
        let plaintext = b"Hello, SecureCloud! This is secret data.";

        let sealed = seal(&key, plaintext).unwrap();
        let opened = open(&key, &sealed).unwrap();

        assert_eq!(&opened, plaintext);
        assert_eq!(sealed.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = Secret32::random();
        let key2 = Secret32::random();

        let sealed = seal(&key1, b"secret").unwrap();
        let result = open(&key2, &sealed);

        assert!(matches!(result, Err(VaultError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = Secret32::random();

        let mut sealed = seal(&key, b"secret").unwrap();
        sealed[NONCE_LEN] ^= 0xFF; // flip a byte
        let result = open(&key, &sealed);

        assert!(matches!(result, Err(VaultError::DecryptionFailed(_))));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = Secret32::random();
        let sealed = seal(&key, b"").unwrap();
        let opened = open(&key, &sealed).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_large_plaintext() {
        let key = Secret32::random();
        let plaintext = vec![0xAB; 2 * 1024 * 1024]; // 2 MiB

        let sealed = seal(&key, &plaintext).unwrap();
        let opened = open(&key, &sealed).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let key = Secret32::random();
        assert!(open(&key, &[0u8; 10]).is_err());
    }

    #[test]
    fn test_seal_is_nondeterministic() {
        let key = Secret32::random();
        let a = seal(&key, b"same input").unwrap();
        let b = seal(&key, b"same input").unwrap();
        assert_ne!(a, b);
    }
}
