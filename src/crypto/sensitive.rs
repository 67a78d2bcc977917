/// 32 bytes of secret material, wiped from memory on drop.
///
/// Covers every secret this crate holds in process memory: file encryption
/// keys, HKDF-derived wrapping keys, ECDH shared secrets, and
/// password-derived keys.
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret32 {
    bytes: [u8; 32],
}

impl Secret32 {
    /// Draw 32 fresh bytes from the OS CSPRNG. Used for file encryption
    /// keys.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Copy a slice into owned, wiped-on-drop storage. Returns None when
    /// the slice is not exactly 32 bytes.
    pub fn copy_from(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Self { bytes })
    }

    /// The raw bytes. Callers must not copy them anywhere that outlives
    /// the secret.
    pub fn expose(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Take ownership of key material produced elsewhere (HKDF output, a
/// hardware provider's shared secret).
impl From<[u8; 32]> for Secret32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }
}
