/// P-256 key material.
///
/// One curve serves both roles: ECDH (NIST P-256) for FEK wrapping and
/// ECDSA (same curve) for grant signatures. Public keys travel as 65-byte
/// x9.63/SEC1 uncompressed points. Private keys come in two variants:
/// device-bound hardware material resolved through a platform provider, or
/// a software scalar. Both variants answer the same `shared_secret` and
/// `sign` operations.
use std::fmt;
use std::sync::Arc;

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use zeroize::Zeroize;

use crate::crypto::sensitive::Secret32;
use crate::error::{Result, VaultError};

/// Length of an x9.63 uncompressed P-256 public key.
pub const PUBLIC_KEY_LEN: usize = 65;

const SOFTWARE_BLOB_TAG: u8 = 0x01;
const HARDWARE_BLOB_TAG: u8 = 0x02;

/// Intended role of a generated key, passed through to hardware providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    KeyAgreement,
    Signing,
}

/// Platform seam for device-bound private keys (secure enclave, TPM, …).
///
/// Blobs are opaque to this crate: they are persisted as-is and can only be
/// exercised through the provider on the device that minted them.
pub trait HardwareKeyProvider: Send + Sync {
    /// Whether this device can mint hardware-backed keys right now.
    fn is_available(&self) -> bool;

    /// Generate a key pair. Returns (opaque private blob, SEC1 uncompressed
    /// public key).
    fn generate(&self, usage: KeyUsage) -> Result<(Vec<u8>, Vec<u8>)>;

    /// ECDH between the blob's scalar and a peer public key; returns the
    /// 32-byte x-coordinate of the shared point.
    fn shared_secret(&self, blob: &[u8], peer_public: &[u8]) -> Result<[u8; 32]>;

    /// ECDSA-P256 over SHA-256(message); returns a DER-encoded signature.
    fn sign(&self, blob: &[u8], message: &[u8]) -> Result<Vec<u8>>;
}

/// A long-term private key, resident only in memory.
#[derive(Clone)]
pub enum PrivateKey {
    /// Device-bound material; `blob` is meaningful only to `provider`.
    Hardware {
        blob: Vec<u8>,
        provider: Arc<dyn HardwareKeyProvider>,
    },
    /// A P-256 scalar held in process memory (zeroized on drop).
    Software(SecretKey),
}

impl PrivateKey {
    /// Generate a fresh key, preferring hardware-backed material when a
    /// provider is present and reports availability.
    ///
    /// Returns the private key together with its SEC1 uncompressed public
    /// key bytes.
    pub fn generate(
        usage: KeyUsage,
        provider: Option<&Arc<dyn HardwareKeyProvider>>,
    ) -> Result<(Self, Vec<u8>)> {
        if let Some(provider) = provider {
            if provider.is_available() {
                let (blob, public) = provider.generate(usage)?;
                return Ok((
                    Self::Hardware {
                        blob,
                        provider: Arc::clone(provider),
                    },
                    public,
                ));
            }
        }

        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
        Ok((Self::Software(secret), public))
    }

    /// Whether this key lives in device hardware.
    pub fn is_hardware_backed(&self) -> bool {
        matches!(self, Self::Hardware { .. })
    }

    /// ECDH with a peer's SEC1 public key. Both variants return the 32-byte
    /// x-coordinate of the shared point.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<Secret32> {
        match self {
            Self::Hardware { blob, provider } => {
                let secret = provider.shared_secret(blob, peer_public)?;
                Ok(Secret32::from(secret))
            }
            Self::Software(secret) => {
                let peer = PublicKey::from_sec1_bytes(peer_public).map_err(|_| {
                    VaultError::DecryptionFailed("invalid peer public key".to_string())
                })?;
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                Secret32::copy_from(shared.raw_secret_bytes()).ok_or_else(|| {
                    VaultError::KeyGenerationFailed(
                        "unexpected shared secret length".to_string(),
                    )
                })
            }
        }
    }

    /// ECDSA-P256 over SHA-256(message); DER-encoded signature.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Hardware { blob, provider } => provider.sign(blob, message),
            Self::Software(secret) => {
                let signing_key = SigningKey::from(secret);
                let signature: Signature = signing_key.sign(message);
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Encode for the secret store: tag byte, then scalar or provider blob.
    pub fn to_blob(&self) -> Vec<u8> {
        match self {
            Self::Hardware { blob, .. } => {
                let mut out = Vec::with_capacity(1 + blob.len());
                out.push(HARDWARE_BLOB_TAG);
                out.extend_from_slice(blob);
                out
            }
            Self::Software(secret) => {
                let mut scalar = [0u8; 32];
                scalar.copy_from_slice(&secret.to_bytes());
                let mut out = Vec::with_capacity(33);
                out.push(SOFTWARE_BLOB_TAG);
                out.extend_from_slice(&scalar);
                scalar.zeroize();
                out
            }
        }
    }

    /// Reconstruct a private key from a persisted blob.
    ///
    /// A software-shaped blob (tagged, or a legacy bare 32-byte scalar) is
    /// rebuilt in software. A hardware-tagged blob requires the provider
    /// that minted it; without one the call fails rather than downgrading.
    pub fn from_blob(
        blob: &[u8],
        provider: Option<&Arc<dyn HardwareKeyProvider>>,
    ) -> Result<Self> {
        match blob.first() {
            Some(&SOFTWARE_BLOB_TAG) if blob.len() == 33 => {
                let secret = SecretKey::from_slice(&blob[1..]).map_err(|_| {
                    VaultError::KeyGenerationFailed("stored scalar is not a valid key".to_string())
                })?;
                Ok(Self::Software(secret))
            }
            Some(&HARDWARE_BLOB_TAG) => match provider {
                Some(provider) => Ok(Self::Hardware {
                    blob: blob[1..].to_vec(),
                    provider: Arc::clone(provider),
                }),
                None => Err(VaultError::KeyGenerationFailed(
                    "hardware-backed key blob cannot be used on this device".to_string(),
                )),
            },
            // Legacy encoding: a bare scalar is unambiguously software.
            _ if blob.len() == 32 => {
                let secret = SecretKey::from_slice(blob).map_err(|_| {
                    VaultError::KeyGenerationFailed("stored scalar is not a valid key".to_string())
                })?;
                Ok(Self::Software(secret))
            }
            _ => Err(VaultError::KeyGenerationFailed(
                "unrecognized private key blob".to_string(),
            )),
        }
    }
}

impl fmt::Debug for PrivateKey {
    // Key material never reaches Debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware { .. } => f.write_str("PrivateKey::Hardware"),
            Self::Software(_) => f.write_str("PrivateKey::Software"),
        }
    }
}

/// Check that `bytes` is a valid uncompressed P-256 point.
pub fn is_valid_public_key(bytes: &[u8]) -> bool {
    bytes.len() == PUBLIC_KEY_LEN && PublicKey::from_sec1_bytes(bytes).is_ok()
}
