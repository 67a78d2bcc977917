/// SCV2 encrypted file container.
///
/// On-disk layout (integers little-endian):
/// [header_json_len(8) | header_json (UTF-8) | sealed_body]
/// where sealed_body = nonce(12) || ciphertext || tag(16).
///
/// The header is JSON for forward compatibility of optional fields; every
/// byte field is base-64. This module is a pure codec: it enforces the
/// structural invariants and leaves all cryptographic validation to the
/// engine.
pub mod scv1;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::kdf::SALT_LEN;
use crate::crypto::keys::PUBLIC_KEY_LEN;
use crate::error::{Result, VaultError};

pub const MAGIC: &str = "SCV2";
pub const VERSION: u32 = 2;

/// Wrapped FEK width: nonce(12) || key ciphertext(32) || tag(16).
pub const WRAPPED_FEK_LEN: usize = 60;

/// Base-64 (standard alphabet) encoding for JSON byte fields. Shared with
/// the other JSON surfaces (identity descriptor, QR payload, contacts).
pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Which holder a FEK block addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Owner,
    Recipient,
}

/// A per-holder FEK authorization record (a "grant").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FekBlock {
    #[serde(rename = "blockType")]
    pub block_type: BlockType,
    /// Holder's encryption public key (x9.63 uncompressed, 65 bytes).
    #[serde(rename = "holderPublicKeyData", with = "b64")]
    pub holder_public_key: Vec<u8>,
    /// Fresh ephemeral public key used for this block's ECDH (65 bytes).
    #[serde(rename = "ephemeralPublicKeyData", with = "b64")]
    pub ephemeral_public_key: Vec<u8>,
    /// HKDF salt (16 bytes, random per block).
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    /// Wrapped FEK: nonce(12) || ciphertext(32) || tag(16).
    #[serde(rename = "wrappedFEKCombined", with = "b64")]
    pub wrapped_fek: Vec<u8>,
    /// Unix seconds when the grant was issued; 0 for owner blocks.
    pub timestamp: u64,
    /// DER-encoded ECDSA-P256 signature by the owner's signing key.
    #[serde(rename = "signatureData", with = "b64")]
    pub signature: Vec<u8>,
}

impl FekBlock {
    /// The byte string the owner signs: file_id || holder_pk ||
    /// ephemeral_pk || salt || wrapped_fek || timestamp (u64 LE).
    pub fn signing_payload(&self, file_id: &Uuid) -> Vec<u8> {
        let mut payload = Vec::with_capacity(
            16 + self.holder_public_key.len()
                + self.ephemeral_public_key.len()
                + self.salt.len()
                + self.wrapped_fek.len()
                + 8,
        );
        payload.extend_from_slice(file_id.as_bytes());
        payload.extend_from_slice(&self.holder_public_key);
        payload.extend_from_slice(&self.ephemeral_public_key);
        payload.extend_from_slice(&self.salt);
        payload.extend_from_slice(&self.wrapped_fek);
        payload.extend_from_slice(&self.timestamp.to_le_bytes());
        payload
    }
}

/// The self-describing SCV2 header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub magic: String,
    pub version: u32,
    #[serde(rename = "fileId")]
    pub file_id: Uuid,
    pub filename: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "originalSize")]
    pub original_size: u64,
    #[serde(rename = "ownerEncryptionPublicKeyData", with = "b64")]
    pub owner_encryption_public_key: Vec<u8>,
    #[serde(rename = "ownerSigningPublicKeyData", with = "b64")]
    pub owner_signing_public_key: Vec<u8>,
    #[serde(rename = "fekBlocks")]
    pub fek_blocks: Vec<FekBlock>,
}

impl ContainerHeader {
    /// Structural validation. Cryptographic checks (signatures, owner block
    /// uniqueness) are the engine's responsibility.
    fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(VaultError::InvalidFormat(format!(
                "bad magic: {:?}",
                self.magic
            )));
        }
        if self.version != VERSION {
            return Err(VaultError::InvalidFormat(format!(
                "unsupported version: {}",
                self.version
            )));
        }
        if self.owner_encryption_public_key.len() != PUBLIC_KEY_LEN
            || self.owner_signing_public_key.len() != PUBLIC_KEY_LEN
        {
            return Err(VaultError::InvalidFormat(
                "owner public key has wrong length".to_string(),
            ));
        }
        for block in &self.fek_blocks {
            if block.holder_public_key.len() != PUBLIC_KEY_LEN
                || block.ephemeral_public_key.len() != PUBLIC_KEY_LEN
            {
                return Err(VaultError::InvalidFormat(
                    "block public key has wrong length".to_string(),
                ));
            }
            if block.salt.len() != SALT_LEN {
                return Err(VaultError::InvalidFormat(
                    "block salt has wrong length".to_string(),
                ));
            }
            if block.wrapped_fek.len() != WRAPPED_FEK_LEN {
                return Err(VaultError::InvalidFormat(
                    "wrapped FEK has wrong length".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A parsed SCV2 file: header plus the untouched sealed body.
#[derive(Debug, Clone)]
pub struct EncryptedContainer {
    pub header: ContainerHeader,
    pub sealed_body: Vec<u8>,
}

impl EncryptedContainer {
    /// Emit the framed file: length prefix, header JSON, sealed body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header_json = serde_json::to_vec(&self.header)
            .map_err(|e| VaultError::Serialization(e.to_string()))?;

        let mut out = Vec::with_capacity(8 + header_json.len() + self.sealed_body.len());
        out.extend_from_slice(&(header_json.len() as u64).to_le_bytes());
        out.extend_from_slice(&header_json);
        out.extend_from_slice(&self.sealed_body);
        Ok(out)
    }

    /// Parse a framed file.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(VaultError::InvalidFormat(format!(
                "file too short: {} bytes",
                data.len()
            )));
        }

        let header_len = u64::from_le_bytes(data[..8].try_into().unwrap());
        if header_len == 0 || header_len > (data.len() - 8) as u64 {
            return Err(VaultError::InvalidFormat(format!(
                "header length out of range: {header_len}"
            )));
        }
        let header_len = header_len as usize;

        let header: ContainerHeader = serde_json::from_slice(&data[8..8 + header_len])
            .map_err(|e| VaultError::InvalidFormat(format!("header JSON: {e}")))?;
        header.validate()?;

        Ok(Self {
            header,
            sealed_body: data[8 + header_len..].to_vec(),
        })
    }
}
