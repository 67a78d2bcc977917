/// Share-capable encryption engine.
///
/// The orchestration core of the vault:
/// 1. Seal the file body once under a fresh random FEK (AES-256-GCM)
/// 2. Wrap the FEK per authorized holder: ephemeral P-256 ECDH →
///    HKDF-SHA256 → AES-256-GCM
/// 3. Sign every grant with the owner's ECDSA key, bound to the file id
/// 4. Maintain the holder set: append grants on share, drop them on revoke
///
/// Sharing never re-encrypts the body: the FEK is a long-lived per-file
/// secret, so revocation removes access to future copies, not knowledge a
/// recipient already extracted. All operations are synchronous and return
/// new byte strings; inputs are never mutated.
use chrono::Utc;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::contacts::TrustedContact;
use crate::container::{BlockType, ContainerHeader, EncryptedContainer, FekBlock, MAGIC, VERSION};
use crate::crypto::keys::PrivateKey;
use crate::crypto::sensitive::Secret32;
use crate::crypto::{aead, kdf};
use crate::error::{Result, VaultError};
use crate::identity::KeyPair;
use crate::verification::{safety_code, verify_grant};

/// HKDF domain separation for owner blocks.
const OWNER_BLOCK_INFO: &[u8] = b"SecureCloud-FEK-Owner-v2";
/// HKDF domain separation for recipient blocks.
const RECIPIENT_BLOCK_INFO: &[u8] = b"SecureCloud-FEK-Recipient-v2";

/// Oldest acceptable recipient grant.
const MAX_GRANT_AGE_SECS: i64 = 365 * 24 * 60 * 60;
/// Tolerated clock skew for grants that appear to come from the future.
const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Result of a successful decryption.
#[derive(Debug)]
pub struct DecryptedFile {
    pub plaintext: Vec<u8>,
    pub header: ContainerHeader,
}

/// Result of granting a recipient access.
#[derive(Debug)]
pub struct SharedFile {
    /// The re-framed file with the new recipient block appended.
    pub bytes: Vec<u8>,
    /// Human-verifiable code for out-of-band confirmation ("XXXX XXXX").
    pub safety_code: String,
}

fn block_info(kind: BlockType) -> &'static [u8] {
    match kind {
        BlockType::Owner => OWNER_BLOCK_INFO,
        BlockType::Recipient => RECIPIENT_BLOCK_INFO,
    }
}

/// Wrap the FEK for one holder and sign the grant.
///
/// The ephemeral ECDH secret lives only inside this function and is wiped
/// when it drops.
fn build_block(
    kind: BlockType,
    fek: &Secret32,
    holder_public_key: &[u8],
    signing_key: &PrivateKey,
    file_id: Uuid,
    timestamp: u64,
) -> Result<FekBlock> {
    let holder = p256::PublicKey::from_sec1_bytes(holder_public_key)
        .map_err(|_| VaultError::Encryption("invalid holder public key".to_string()))?;

    let ephemeral = EphemeralSecret::random(&mut rand::rngs::OsRng);
    let ephemeral_public = ephemeral
        .public_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec();

    let shared = ephemeral.diffie_hellman(&holder);
    let z = Secret32::copy_from(shared.raw_secret_bytes())
        .ok_or_else(|| VaultError::Encryption("unexpected shared secret length".to_string()))?;

    let salt = kdf::generate_salt();
    let wrap_key = kdf::derive_wrap_key(z.expose(), &salt, block_info(kind))?;
    let wrapped_fek = aead::seal(&wrap_key, fek.expose())?;

    let mut block = FekBlock {
        block_type: kind,
        holder_public_key: holder_public_key.to_vec(),
        ephemeral_public_key: ephemeral_public,
        salt: salt.to_vec(),
        wrapped_fek,
        timestamp,
        signature: Vec::new(),
    };
    block.signature = signing_key.sign(&block.signing_payload(&file_id))?;
    Ok(block)
}

/// Recover the FEK from a block using the caller's encryption key.
fn unwrap_fek(block: &FekBlock, caller: &KeyPair) -> Result<Secret32> {
    let z = caller
        .encryption_key
        .shared_secret(&block.ephemeral_public_key)?;
    let wrap_key = kdf::derive_wrap_key(z.expose(), &block.salt, block_info(block.block_type))?;

    let mut fek_bytes = aead::open(&wrap_key, &block.wrapped_fek)?;
    let fek = Secret32::copy_from(&fek_bytes).ok_or_else(|| {
        VaultError::DecryptionFailed("unwrapped FEK has wrong length".to_string())
    });
    fek_bytes.zeroize();
    fek
}

/// The unique owner block of a header. Zero or several owner blocks mean
/// the container is corrupt.
fn find_owner_block(header: &ContainerHeader) -> Result<&FekBlock> {
    let mut owners = header
        .fek_blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Owner);
    match (owners.next(), owners.next()) {
        (Some(block), None) => Ok(block),
        _ => Err(VaultError::MissingOwnerBlock),
    }
}

/// Reject recipient grants outside the accepted time window.
fn check_grant_age(timestamp: u64) -> Result<()> {
    let age = Utc::now().timestamp() - timestamp as i64;
    if age < -MAX_CLOCK_SKEW_SECS || age >= MAX_GRANT_AGE_SECS {
        return Err(VaultError::ReplayAttackDetected);
    }
    Ok(())
}

/// Encrypt a plaintext into a fresh SCV2 file readable only by its owner.
pub fn encrypt(
    plaintext: &[u8],
    owner: &KeyPair,
    filename: &str,
    content_type: &str,
) -> Result<Vec<u8>> {
    let file_id = Uuid::new_v4();
    let fek = Secret32::random();

    let sealed_body = aead::seal(&fek, plaintext)?;
    let owner_block = build_block(
        BlockType::Owner,
        &fek,
        &owner.identity.encryption_public_key,
        &owner.signing_key,
        file_id,
        0,
    )?;

    let header = ContainerHeader {
        magic: MAGIC.to_string(),
        version: VERSION,
        file_id,
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        original_size: plaintext.len() as u64,
        owner_encryption_public_key: owner.identity.encryption_public_key.clone(),
        owner_signing_public_key: owner.identity.signing_public_key.clone(),
        fek_blocks: vec![owner_block],
    };

    debug!(file_id = %file_id, size = plaintext.len(), "sealed file");
    EncryptedContainer {
        header,
        sealed_body,
    }
    .to_bytes()
}

/// Decrypt an SCV2 file with the caller's key pair.
///
/// The caller's grant is located by encryption public key, then its
/// signature is verified against the owner's signing key in the header.
/// Recipient grants additionally pass the replay window check before any
/// key material is derived.
pub fn decrypt(file_bytes: &[u8], caller: &KeyPair) -> Result<DecryptedFile> {
    let container = EncryptedContainer::from_bytes(file_bytes)?;
    let header = container.header;

    let caller_public = &caller.identity.encryption_public_key;
    let block = if *caller_public == header.owner_encryption_public_key {
        find_owner_block(&header)?
    } else {
        header
            .fek_blocks
            .iter()
            .find(|b| {
                b.block_type == BlockType::Recipient && b.holder_public_key == *caller_public
            })
            .ok_or(VaultError::NoRecipientBlock)?
    };

    verify_grant(block, &header)?;
    if block.block_type == BlockType::Recipient {
        check_grant_age(block.timestamp)?;
    }

    let fek = unwrap_fek(block, caller)?;
    let plaintext = aead::open(&fek, &container.sealed_body)?;

    debug!(file_id = %header.file_id, size = plaintext.len(), "opened file");
    Ok(DecryptedFile { plaintext, header })
}

/// Grant a verified contact access to an existing file.
///
/// The FEK is unwrapped from the owner block and re-wrapped under the
/// recipient's public key; the sealed body passes through untouched.
/// Returns the new file bytes and the share-time safety code.
pub fn add_recipient(
    file_bytes: &[u8],
    recipient: &TrustedContact,
    owner: &KeyPair,
) -> Result<SharedFile> {
    if !recipient.is_verified() {
        return Err(VaultError::ContactNotVerified);
    }

    let mut container = EncryptedContainer::from_bytes(file_bytes)?;

    let owner_block = find_owner_block(&container.header)?;
    verify_grant(owner_block, &container.header)?;
    let fek = unwrap_fek(owner_block, owner)?;

    let block = build_block(
        BlockType::Recipient,
        &fek,
        &recipient.encryption_public_key,
        &owner.signing_key,
        container.header.file_id,
        Utc::now().timestamp() as u64,
    )?;
    let code = safety_code(&block.ephemeral_public_key, &recipient.encryption_public_key);

    // One block per holder: a re-grant replaces the previous one.
    container.header.fek_blocks.retain(|b| {
        !(b.block_type == BlockType::Recipient
            && b.holder_public_key == recipient.encryption_public_key)
    });
    container.header.fek_blocks.push(block);

    info!(
        file_id = %container.header.file_id,
        contact_id = %recipient.contact_id,
        blocks = container.header.fek_blocks.len(),
        "granted file access"
    );
    Ok(SharedFile {
        bytes: container.to_bytes()?,
        safety_code: code,
    })
}

/// Revoke a recipient's access by removing every grant addressed to their
/// public key. Idempotent: revoking an absent recipient returns an
/// equivalent file. Owner-only; the owner block is never removed.
pub fn remove_recipient(
    file_bytes: &[u8],
    recipient_public_key: &[u8],
    owner: &KeyPair,
) -> Result<Vec<u8>> {
    let mut container = EncryptedContainer::from_bytes(file_bytes)?;

    if container.header.owner_encryption_public_key != owner.identity.encryption_public_key {
        return Err(VaultError::DecryptionFailed(
            "caller does not own this file".to_string(),
        ));
    }

    let before = container.header.fek_blocks.len();
    container.header.fek_blocks.retain(|b| {
        !(b.block_type == BlockType::Recipient && b.holder_public_key == recipient_public_key)
    });

    let removed = before - container.header.fek_blocks.len();
    if removed > 0 {
        info!(
            file_id = %container.header.file_id,
            removed,
            "revoked file access"
        );
    }
    container.to_bytes()
}
