/// Identity fingerprints and grant verification.
///
/// Everything here is a deterministic pure function over public key
/// material: fingerprints and safety codes for out-of-band comparison, the
/// QR payload for identity exchange, and ECDSA verification of FEK-block
/// grants.
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::{b64, ContainerHeader, FekBlock};
use crate::crypto::hash::sha256_pair;
use crate::crypto::keys::is_valid_public_key;
use crate::error::{Result, VaultError};
use crate::identity::Identity;

/// SHA-256 over the identity's concatenated public keys (enc || sign).
pub fn fingerprint_bytes(identity: &Identity) -> [u8; 32] {
    sha256_pair(
        &identity.encryption_public_key,
        &identity.signing_public_key,
    )
}

/// Render 2-byte chunks as 4 uppercase hex chars, joined by `separator`.
fn hex_groups(bytes: &[u8], separator: char) -> String {
    bytes
        .chunks(2)
        .map(|pair| format!("{:02X}{:02X}", pair[0], pair[1]))
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

/// Full fingerprint: 8 space-separated groups of 4 hex chars (39 chars).
pub fn full_fingerprint(identity: &Identity) -> String {
    hex_groups(&fingerprint_bytes(identity)[..16], ' ')
}

/// Short fingerprint: 4 dash-separated groups of 4 hex chars (19 chars).
pub fn short_fingerprint(identity: &Identity) -> String {
    hex_groups(&fingerprint_bytes(identity)[..8], '-')
}

/// Cross-fingerprint of two identities: each party's 32 fingerprint bytes
/// XOR-folded down to 4 output bytes, rendered "XXXX XXXX". Symmetric, so
/// both sides can read the same code aloud.
pub fn cross_fingerprint(me: &Identity, them: &Identity) -> String {
    let mine = fingerprint_bytes(me);
    let theirs = fingerprint_bytes(them);

    let mut folded = [0u8; 4];
    for (i, out) in folded.iter_mut().enumerate() {
        for j in 0..8 {
            let idx = (i * 8 + j) % 32;
            *out ^= mine[idx] ^ theirs[idx];
        }
    }
    hex_groups(&folded, ' ')
}

/// Share-time safety code: first 4 bytes of SHA-256(ephemeral_pk ||
/// recipient_pk), rendered "XXXX XXXX". The single implementation used by
/// both the verification surface and the engine.
pub fn safety_code(ephemeral_public_key: &[u8], recipient_public_key: &[u8]) -> String {
    let digest = sha256_pair(ephemeral_public_key, recipient_public_key);
    hex_groups(&digest[..4], ' ')
}

/// Verify a FEK block's grant signature against the header's owner signing
/// key.
///
/// Every failure mode (owner key decode, DER decode, signature mismatch)
/// collapses to `SignatureVerificationFailed` so callers cannot
/// distinguish parsing from cryptographic rejection.
pub fn verify_grant(block: &FekBlock, header: &ContainerHeader) -> Result<()> {
    let verifying_key = VerifyingKey::from_sec1_bytes(&header.owner_signing_public_key)
        .map_err(|_| VaultError::SignatureVerificationFailed)?;

    let signature = Signature::from_der(&block.signature)
        .map_err(|_| VaultError::SignatureVerificationFailed)?;

    let payload = block.signing_payload(&header.file_id);
    verifying_key
        .verify(&payload, &signature)
        .map_err(|_| VaultError::SignatureVerificationFailed)
}

/// The QR exchange payload. Key names are the on-wire contract.
#[derive(Debug, Serialize, Deserialize)]
struct QrIdentityPayload {
    user_id: Uuid,
    #[serde(rename = "encPK", with = "b64")]
    encryption_public_key: Vec<u8>,
    #[serde(rename = "signPK", with = "b64")]
    signing_public_key: Vec<u8>,
    #[serde(rename = "displayName")]
    display_name: String,
}

/// Encode an identity for QR display.
pub fn qr_payload(identity: &Identity) -> Result<String> {
    let payload = QrIdentityPayload {
        user_id: identity.user_id,
        encryption_public_key: identity.encryption_public_key.clone(),
        signing_public_key: identity.signing_public_key.clone(),
        display_name: identity.display_name.clone(),
    };
    serde_json::to_string(&payload).map_err(|e| VaultError::Serialization(e.to_string()))
}

/// Decode a scanned QR payload into an identity.
///
/// Both public keys must be valid P-256 points; anything else is rejected
/// before an identity is constructed. `created_at` records the import
/// time, since the remote creation time does not travel in the payload.
pub fn identity_from_qr(payload: &str) -> Result<Identity> {
    let payload: QrIdentityPayload = serde_json::from_str(payload)
        .map_err(|e| VaultError::InvalidFormat(format!("QR payload: {e}")))?;

    if !is_valid_public_key(&payload.encryption_public_key)
        || !is_valid_public_key(&payload.signing_public_key)
    {
        return Err(VaultError::InvalidFormat(
            "QR payload carries an invalid public key".to_string(),
        ));
    }

    Ok(Identity {
        user_id: payload.user_id,
        encryption_public_key: payload.encryption_public_key,
        signing_public_key: payload.signing_public_key,
        created_at: chrono::Utc::now(),
        display_name: payload.display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{BlockType, MAGIC, VERSION, WRAPPED_FEK_LEN};
    use crate::crypto::kdf::SALT_LEN;
    use crate::crypto::keys::{KeyUsage, PrivateKey, PUBLIC_KEY_LEN};

    fn test_identity(name: &str) -> Identity {
        let (_, enc_pub) = PrivateKey::generate(KeyUsage::KeyAgreement, None).unwrap();
        let (_, sign_pub) = PrivateKey::generate(KeyUsage::Signing, None).unwrap();
        Identity {
            user_id: Uuid::new_v4(),
            encryption_public_key: enc_pub,
            signing_public_key: sign_pub,
            created_at: chrono::Utc::now(),
            display_name: name.to_string(),
        }
    }

    fn signed_block(
        signing_key: &PrivateKey,
        file_id: &Uuid,
        timestamp: u64,
    ) -> FekBlock {
        let mut block = FekBlock {
            block_type: BlockType::Recipient,
            holder_public_key: vec![0x04; PUBLIC_KEY_LEN],
            ephemeral_public_key: vec![0x05; PUBLIC_KEY_LEN],
            salt: vec![0x06; SALT_LEN],
            wrapped_fek: vec![0x07; WRAPPED_FEK_LEN],
            timestamp,
            signature: Vec::new(),
        };
        block.signature = signing_key.sign(&block.signing_payload(file_id)).unwrap();
        block
    }

    fn header_for(owner_signing_public_key: Vec<u8>, file_id: Uuid) -> ContainerHeader {
        ContainerHeader {
            magic: MAGIC.to_string(),
            version: VERSION,
            file_id,
            filename: "f".to_string(),
            content_type: "t".to_string(),
            original_size: 0,
            owner_encryption_public_key: vec![0x04; PUBLIC_KEY_LEN],
            owner_signing_public_key,
            fek_blocks: Vec::new(),
        }
    }

    #[test]
    fn test_fingerprint_formats() {
        let identity = test_identity("Alice");

        let full = full_fingerprint(&identity);
        assert_eq!(full.len(), 39);
        assert_eq!(full.matches(' ').count(), 7);

        let short = short_fingerprint(&identity);
        assert_eq!(short.len(), 19);
        assert_eq!(short.matches('-').count(), 3);

        // Deterministic over the same key material.
        assert_eq!(full, full_fingerprint(&identity));
        assert_eq!(short, short_fingerprint(&identity));
        assert!(short.starts_with(&full[..4]));
    }

    #[test]
    fn test_fingerprints_differ_between_identities() {
        let a = test_identity("A");
        let b = test_identity("B");
        assert_ne!(full_fingerprint(&a), full_fingerprint(&b));
    }

    #[test]
    fn test_cross_fingerprint_symmetric() {
        let a = test_identity("A");
        let b = test_identity("B");

        let ab = cross_fingerprint(&a, &b);
        let ba = cross_fingerprint(&b, &a);
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 9);
        assert_eq!(&ab[4..5], " ");
    }

    #[test]
    fn test_safety_code_shape_and_determinism() {
        let a = test_identity("A");
        let b = test_identity("B");

        let code = safety_code(&a.encryption_public_key, &b.encryption_public_key);
        assert_eq!(code, safety_code(&a.encryption_public_key, &b.encryption_public_key));
        assert_eq!(code.len(), 9);
        assert!(code
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 4 { c == ' ' } else { c.is_ascii_hexdigit() && !c.is_ascii_lowercase() }));
    }

    #[test]
    fn test_verify_grant_accepts_valid_signature() {
        let (signing_key, signing_public) =
            PrivateKey::generate(KeyUsage::Signing, None).unwrap();
        let file_id = Uuid::new_v4();

        let block = signed_block(&signing_key, &file_id, 1_700_000_000);
        let header = header_for(signing_public, file_id);

        assert!(verify_grant(&block, &header).is_ok());
    }

    #[test]
    fn test_verify_grant_rejects_tampering() {
        let (signing_key, signing_public) =
            PrivateKey::generate(KeyUsage::Signing, None).unwrap();
        let file_id = Uuid::new_v4();
        let header = header_for(signing_public, file_id);

        // Flipped signature bit.
        let mut block = signed_block(&signing_key, &file_id, 1);
        block.signature[4] ^= 0x01;
        assert!(matches!(
            verify_grant(&block, &header),
            Err(VaultError::SignatureVerificationFailed)
        ));

        // Payload changed after signing.
        let mut block = signed_block(&signing_key, &file_id, 1);
        block.timestamp = 2;
        assert!(matches!(
            verify_grant(&block, &header),
            Err(VaultError::SignatureVerificationFailed)
        ));

        // Signature is not DER at all.
        let mut block = signed_block(&signing_key, &file_id, 1);
        block.signature = vec![0xFF; 8];
        assert!(matches!(
            verify_grant(&block, &header),
            Err(VaultError::SignatureVerificationFailed)
        ));

        // Owner signing key in the header is garbage.
        let block = signed_block(&signing_key, &file_id, 1);
        let bad_header = header_for(vec![0u8; PUBLIC_KEY_LEN], file_id);
        assert!(matches!(
            verify_grant(&block, &bad_header),
            Err(VaultError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn test_qr_roundtrip() {
        let identity = test_identity("Alice");
        let payload = qr_payload(&identity).unwrap();
        let recovered = identity_from_qr(&payload).unwrap();

        assert_eq!(recovered.user_id, identity.user_id);
        assert_eq!(recovered.encryption_public_key, identity.encryption_public_key);
        assert_eq!(recovered.signing_public_key, identity.signing_public_key);
        assert_eq!(recovered.display_name, identity.display_name);
    }

    #[test]
    fn test_qr_field_names() {
        let identity = test_identity("Alice");
        let payload = qr_payload(&identity).unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert!(json["user_id"].is_string());
        assert!(json["encPK"].is_string());
        assert!(json["signPK"].is_string());
        assert_eq!(json["displayName"], "Alice");
    }

    #[test]
    fn test_qr_rejects_invalid_keys() {
        let identity = test_identity("Alice");
        let mut json: serde_json::Value =
            serde_json::from_str(&qr_payload(&identity).unwrap()).unwrap();

        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        json["encPK"] = serde_json::Value::String(STANDARD.encode([0u8; PUBLIC_KEY_LEN]));

        let result = identity_from_qr(&json.to_string());
        assert!(matches!(result, Err(VaultError::InvalidFormat(_))));

        assert!(identity_from_qr("not json").is_err());
    }
}
