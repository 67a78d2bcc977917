/// SCV1: the legacy password-based container.
///
/// Used only when no device identity has been provisioned. Fixed-width
/// header, then the AEAD ciphertext:
/// [magic "SC_V"(4) | version 00 01 (2) | salt(16) | nonce(12) |
///  original_size(8 LE) | ciphertext || tag(16)]
///
/// The key is HKDF-SHA256 over the UTF-8 password with the stored salt;
/// see `crypto::kdf::derive_password_key_pbkdf2` for the documented
/// stronger alternative (not part of this on-disk format).
use crate::crypto::aead::{self, NONCE_LEN};
use crate::crypto::kdf::{self, SALT_LEN};
use crate::error::{Result, VaultError};

pub const MAGIC: [u8; 4] = *b"SC_V";
pub const VERSION: [u8; 2] = [0x00, 0x01];
pub const HEADER_LEN: usize = 4 + 2 + SALT_LEN + NONCE_LEN + 8; // 42

/// Encrypt data under a password into the SCV1 layout.
pub fn encrypt(data: &[u8], password: &str) -> Result<Vec<u8>> {
    let salt = kdf::generate_salt();
    let nonce = aead::generate_nonce();

    let key = kdf::derive_password_key(password, &salt)?;
    let ciphertext = aead::seal_with_nonce(&key, &nonce, data)?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an SCV1 file.
///
/// Structural failures (too short, bad magic or version) are
/// `InvalidFormat`; a failed AEAD open (wrong password, tampering) is
/// `DecryptionFailed`. Callers rely on the distinction.
pub fn decrypt(bytes: &[u8], password: &str) -> Result<Vec<u8>> {
    if bytes.len() <= HEADER_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "SCV1 file too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[..4] != MAGIC {
        return Err(VaultError::InvalidFormat("bad SCV1 magic".to_string()));
    }
    if bytes[4..6] != VERSION {
        return Err(VaultError::InvalidFormat(format!(
            "unsupported SCV1 version: {:02x}{:02x}",
            bytes[4], bytes[5]
        )));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes[6..6 + SALT_LEN]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&bytes[22..22 + NONCE_LEN]);

    let key = kdf::derive_password_key(password, &salt)?;
    aead::open_with_nonce(&key, &nonce, &bytes[HEADER_LEN..])
}
