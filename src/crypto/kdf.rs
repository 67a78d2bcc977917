/// HKDF-SHA256 key derivation.
///
/// Two derivation paths share this module:
/// - FEK wrapping keys: IKM is an ECDH shared secret, info is the
///   per-block-kind domain-separation string.
/// - SCV1 password keys: IKM is the UTF-8 password, info is
///   "SecureCloud-AES256GCM".
/// Produces 256-bit (32-byte) AES keys in both cases.
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::crypto::sensitive::Secret32;
use crate::error::{Result, VaultError};

pub const SALT_LEN: usize = 16;

/// HKDF info string for SCV1 password-based keys.
pub const PASSWORD_KDF_INFO: &[u8] = b"SecureCloud-AES256GCM";

/// PBKDF2 iteration count for the documented alternative derivation.
pub const PBKDF2_ITERATIONS: u32 = 310_000;

/// Generate a random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 32-byte wrapping key with HKDF-SHA256.
pub fn derive_wrap_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<Secret32> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyGenerationFailed(format!("HKDF expand: {e}")))?;
    Ok(Secret32::from(okm))
}

/// Derive the SCV1 password key: HKDF-SHA256 over the UTF-8 password.
pub fn derive_password_key(password: &str, salt: &[u8]) -> Result<Secret32> {
    derive_wrap_key(password.as_bytes(), salt, PASSWORD_KDF_INFO)
}

/// PBKDF2-SHA256 password derivation at 310,000 iterations.
///
/// Stronger, slower alternative to [`derive_password_key`]. The SCV1 header
/// carries no KDF tag, so files written with this key are not readable by
/// the stock codec; it is offered for callers deriving keys outside the
/// SCV1 on-disk format.
pub fn derive_password_key_pbkdf2(password: &str, salt: &[u8]) -> Secret32 {
    let mut okm = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut okm);
    Secret32::from(okm)
}
