/// Trusted contacts: locally known remote identities and their
/// verification state.
///
/// The registry is an ordered collection persisted as a JSON array in a
/// single file. Writes land in a temporary sibling and are renamed into
/// place, and every operation serializes through one lock, so readers see
/// either the pre-op or post-op state.
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::container::b64;
use crate::error::{Result, VaultError};
use crate::identity::Identity;

/// How a contact's identity was authenticated out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMethod {
    QrScan,
    SafetyNumber,
    Unverified,
}

impl VerificationMethod {
    pub fn is_verified(&self) -> bool {
        !matches!(self, Self::Unverified)
    }
}

/// Local record of a remote identity.
///
/// Invariant: `verification_method == Unverified` exactly when
/// `verified_at` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedContact {
    /// Local identifier, distinct from the remote `user_id`.
    pub contact_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    #[serde(with = "b64")]
    pub encryption_public_key: Vec<u8>,
    #[serde(with = "b64")]
    pub signing_public_key: Vec<u8>,
    pub added_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_method: VerificationMethod,
}

impl TrustedContact {
    /// Import a freshly received identity as an unverified contact.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            contact_id: Uuid::new_v4(),
            user_id: identity.user_id,
            display_name: identity.display_name.clone(),
            encryption_public_key: identity.encryption_public_key.clone(),
            signing_public_key: identity.signing_public_key.clone(),
            added_at: Utc::now(),
            verified_at: None,
            verification_method: VerificationMethod::Unverified,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verification_method.is_verified()
    }

    /// Project this contact as an identity (for fingerprint derivations).
    /// A pure view; the contact keeps no back-reference.
    pub fn as_identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            encryption_public_key: self.encryption_public_key.clone(),
            signing_public_key: self.signing_public_key.clone(),
            created_at: self.added_at,
            display_name: self.display_name.clone(),
        }
    }
}

/// Persistent ordered registry of trusted contacts.
pub struct ContactRegistry {
    path: PathBuf,
    contacts: RwLock<Vec<TrustedContact>>,
}

impl ContactRegistry {
    /// Open (or create) the registry backed by `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contacts = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| VaultError::Serialization(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            contacts: RwLock::new(contacts),
        })
    }

    /// All contacts, in insertion order.
    pub async fn all(&self) -> Vec<TrustedContact> {
        self.contacts.read().await.clone()
    }

    pub async fn by_id(&self, contact_id: Uuid) -> Option<TrustedContact> {
        self.contacts
            .read()
            .await
            .iter()
            .find(|c| c.contact_id == contact_id)
            .cloned()
    }

    pub async fn by_remote_user_id(&self, user_id: Uuid) -> Option<TrustedContact> {
        self.contacts
            .read()
            .await
            .iter()
            .find(|c| c.user_id == user_id)
            .cloned()
    }

    /// Insert a new contact or replace the record with the same
    /// `contact_id`, keeping its position.
    pub async fn upsert(&self, contact: TrustedContact) -> Result<()> {
        let mut contacts = self.contacts.write().await;
        match contacts
            .iter_mut()
            .find(|c| c.contact_id == contact.contact_id)
        {
            Some(existing) => *existing = contact,
            None => {
                debug!(contact_id = %contact.contact_id, "adding trusted contact");
                contacts.push(contact);
            }
        }
        self.persist(&contacts).await
    }

    /// Remove a contact. Removing an unknown id is a no-op.
    pub async fn delete(&self, contact_id: Uuid) -> Result<()> {
        let mut contacts = self.contacts.write().await;
        contacts.retain(|c| c.contact_id != contact_id);
        self.persist(&contacts).await
    }

    /// Set the verification state of a contact.
    ///
    /// A verified method records `verified_at = now`; `Unverified` clears
    /// it. Returns the updated record, or None for an unknown id.
    pub async fn mark_verified(
        &self,
        contact_id: Uuid,
        method: VerificationMethod,
    ) -> Result<Option<TrustedContact>> {
        let mut contacts = self.contacts.write().await;
        let Some(contact) = contacts.iter_mut().find(|c| c.contact_id == contact_id) else {
            return Ok(None);
        };

        contact.verification_method = method;
        contact.verified_at = if method.is_verified() {
            Some(Utc::now())
        } else {
            None
        };
        let updated = contact.clone();

        info!(contact_id = %contact_id, ?method, "updated contact verification");
        self.persist(&contacts).await?;
        Ok(Some(updated))
    }

    /// Atomic replace of the registry file.
    async fn persist(&self, contacts: &[TrustedContact]) -> Result<()> {
        let json = serde_json::to_vec_pretty(contacts)
            .map_err(|e| VaultError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
