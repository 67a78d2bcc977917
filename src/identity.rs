/// Device identity: the long-term encryption and signing key pairs.
///
/// The service holds no long-term state in memory; every call re-reads the
/// secret store. Private keys exist only as reconstructed `PrivateKey`
/// values inside a `KeyPair` and are dropped with it.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::container::b64;
use crate::crypto::keys::{HardwareKeyProvider, KeyUsage, PrivateKey};
use crate::error::{Result, VaultError};
use crate::keystore::SecretStore;

/// Secret-store accounts used by the identity service.
pub const IDENTITY_ACCOUNT: &str = "identity";
pub const ENCRYPTION_KEY_ACCOUNT: &str = "encryption-key";
pub const SIGNING_KEY_ACCOUNT: &str = "signing-key";

/// Public descriptor of a device identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable opaque identifier; immutable once persisted.
    pub user_id: Uuid,
    /// x9.63 uncompressed P-256 point (65 bytes).
    #[serde(with = "b64")]
    pub encryption_public_key: Vec<u8>,
    /// x9.63 uncompressed P-256 point (65 bytes).
    #[serde(with = "b64")]
    pub signing_public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub display_name: String,
}

/// An identity together with its two private keys. Memory-resident only,
/// never serialized.
pub struct KeyPair {
    pub identity: Identity,
    pub encryption_key: PrivateKey,
    pub signing_key: PrivateKey,
}

impl KeyPair {
    /// Whether the private material is device-bound. UI reporting only;
    /// nothing else may branch on the variant.
    pub fn is_hardware_backed(&self) -> bool {
        self.encryption_key.is_hardware_backed() && self.signing_key.is_hardware_backed()
    }
}

/// Generates, loads, updates, and destroys the device identity.
pub struct IdentityService {
    store: Arc<dyn SecretStore>,
    hardware: Option<Arc<dyn HardwareKeyProvider>>,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn SecretStore>,
        hardware: Option<Arc<dyn HardwareKeyProvider>>,
    ) -> Self {
        Self { store, hardware }
    }

    /// Create and persist a fresh identity.
    ///
    /// Hardware-backed keys are preferred when a provider is available.
    /// Persistence is all-or-nothing: if any of the three writes fails,
    /// everything written so far is removed and the call fails with
    /// `IdentityInit`.
    pub async fn generate(&self, display_name: &str) -> Result<Identity> {
        let (encryption_key, encryption_public) =
            PrivateKey::generate(KeyUsage::KeyAgreement, self.hardware.as_ref())?;
        let (signing_key, signing_public) =
            PrivateKey::generate(KeyUsage::Signing, self.hardware.as_ref())?;

        let identity = Identity {
            user_id: Uuid::new_v4(),
            encryption_public_key: encryption_public,
            signing_public_key: signing_public,
            created_at: Utc::now(),
            display_name: display_name.to_string(),
        };

        if let Err(e) = self.persist(&identity, &encryption_key, &signing_key).await {
            self.remove_all().await;
            return Err(VaultError::IdentityInit(e.to_string()));
        }

        info!(
            user_id = %identity.user_id,
            hardware_backed = encryption_key.is_hardware_backed(),
            "generated device identity"
        );
        Ok(identity)
    }

    async fn persist(
        &self,
        identity: &Identity,
        encryption_key: &PrivateKey,
        signing_key: &PrivateKey,
    ) -> Result<()> {
        self.store
            .save(ENCRYPTION_KEY_ACCOUNT, &encryption_key.to_blob())
            .await?;
        self.store
            .save(SIGNING_KEY_ACCOUNT, &signing_key.to_blob())
            .await?;
        let descriptor = serde_json::to_vec(identity)
            .map_err(|e| VaultError::Serialization(e.to_string()))?;
        self.store.save(IDENTITY_ACCOUNT, &descriptor).await?;
        Ok(())
    }

    /// Best-effort removal of all three persisted items.
    async fn remove_all(&self) {
        for account in [IDENTITY_ACCOUNT, ENCRYPTION_KEY_ACCOUNT, SIGNING_KEY_ACCOUNT] {
            if let Err(e) = self.store.delete(account).await {
                warn!(account, error = %e, "failed to remove identity item");
            }
        }
    }

    /// Load the public-only identity descriptor.
    pub async fn load_identity(&self) -> Result<Identity> {
        let descriptor = match self.store.load(IDENTITY_ACCOUNT).await {
            Ok(bytes) => bytes,
            Err(VaultError::KeyStoreNotFound(_)) => return Err(VaultError::IdentityNotFound),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&descriptor).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Reconstruct the full key pair from the persisted blobs.
    ///
    /// A hardware-tagged blob that cannot be resolved on this device is a
    /// fatal error, never a silent downgrade to software material.
    pub async fn load_key_pair(&self) -> Result<KeyPair> {
        let identity = self.load_identity().await?;

        let encryption_blob = self.load_key_blob(ENCRYPTION_KEY_ACCOUNT).await?;
        let signing_blob = self.load_key_blob(SIGNING_KEY_ACCOUNT).await?;

        let encryption_key = PrivateKey::from_blob(&encryption_blob, self.hardware.as_ref())?;
        let signing_key = PrivateKey::from_blob(&signing_blob, self.hardware.as_ref())?;

        Ok(KeyPair {
            identity,
            encryption_key,
            signing_key,
        })
    }

    async fn load_key_blob(&self, account: &str) -> Result<Vec<u8>> {
        match self.store.load(account).await {
            Ok(bytes) => Ok(bytes),
            Err(VaultError::KeyStoreNotFound(_)) => Err(VaultError::IdentityNotFound),
            Err(e) => Err(e),
        }
    }

    /// Re-persist the descriptor with a new display name, leaving all key
    /// material untouched.
    pub async fn update_display_name(&self, display_name: &str) -> Result<()> {
        let mut identity = self.load_identity().await?;
        identity.display_name = display_name.to_string();
        let descriptor = serde_json::to_vec(&identity)
            .map_err(|e| VaultError::Serialization(e.to_string()))?;
        self.store.save(IDENTITY_ACCOUNT, &descriptor).await
    }

    /// Non-throwing existence probe.
    pub async fn has_identity(&self) -> bool {
        self.store.exists(IDENTITY_ACCOUNT).await.unwrap_or(false)
    }

    /// Remove all persisted identity material. Permanent: files encrypted
    /// for this identity become unreadable.
    ///
    /// A missing item is not an error. Every item is attempted even when
    /// one removal fails; the first failure is reported.
    pub async fn delete_identity(&self) -> Result<()> {
        let mut first_error = None;
        for account in [ENCRYPTION_KEY_ACCOUNT, SIGNING_KEY_ACCOUNT, IDENTITY_ACCOUNT] {
            if let Err(e) = self.store.delete(account).await {
                warn!(account, error = %e, "failed to delete identity item");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!("deleted device identity");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::is_valid_public_key;
    use crate::keystore::MemorySecretStore;
    use async_trait::async_trait;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use p256::SecretKey;

    fn service() -> IdentityService {
        IdentityService::new(Arc::new(MemorySecretStore::new()), None)
    }

    /// Provider that keeps scalars in its blobs, standing in for a device
    /// enclave in tests.
    struct FakeEnclave;

    impl HardwareKeyProvider for FakeEnclave {
        fn is_available(&self) -> bool {
            true
        }

        fn generate(&self, _usage: KeyUsage) -> Result<(Vec<u8>, Vec<u8>)> {
            let secret = SecretKey::random(&mut rand::rngs::OsRng);
            let public = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
            Ok((secret.to_bytes().to_vec(), public))
        }

        fn shared_secret(&self, blob: &[u8], peer_public: &[u8]) -> Result<[u8; 32]> {
            let secret = SecretKey::from_slice(blob).unwrap();
            PrivateKey::Software(secret)
                .shared_secret(peer_public)
                .map(|s| *s.expose())
        }

        fn sign(&self, blob: &[u8], message: &[u8]) -> Result<Vec<u8>> {
            let secret = SecretKey::from_slice(blob).unwrap();
            PrivateKey::Software(secret).sign(message)
        }
    }

    /// Store whose writes fail for one specific account.
    struct FailingStore {
        inner: MemorySecretStore,
        fail_account: &'static str,
    }

    #[async_trait]
    impl SecretStore for FailingStore {
        async fn save(&self, account: &str, value: &[u8]) -> Result<()> {
            if account == self.fail_account {
                return Err(VaultError::Io(std::io::Error::other("store offline")));
            }
            self.inner.save(account, value).await
        }

        async fn load(&self, account: &str) -> Result<Vec<u8>> {
            self.inner.load(account).await
        }

        async fn delete(&self, account: &str) -> Result<()> {
            self.inner.delete(account).await
        }

        async fn exists(&self, account: &str) -> Result<bool> {
            self.inner.exists(account).await
        }
    }

    #[tokio::test]
    async fn test_generate_and_load() {
        let service = service();
        assert!(!service.has_identity().await);

        let identity = service.generate("Alice").await.unwrap();
        assert!(service.has_identity().await);
        assert!(is_valid_public_key(&identity.encryption_public_key));
        assert!(is_valid_public_key(&identity.signing_public_key));
        assert_ne!(identity.encryption_public_key, identity.signing_public_key);

        let loaded = service.load_identity().await.unwrap();
        assert_eq!(loaded, identity);
    }

    #[tokio::test]
    async fn test_load_without_identity() {
        let service = service();
        assert!(matches!(
            service.load_identity().await,
            Err(VaultError::IdentityNotFound)
        ));
        assert!(matches!(
            service.load_key_pair().await,
            Err(VaultError::IdentityNotFound)
        ));
    }

    #[tokio::test]
    async fn test_key_pair_matches_descriptor() {
        let service = service();
        let identity = service.generate("Alice").await.unwrap();

        let key_pair = service.load_key_pair().await.unwrap();
        assert_eq!(key_pair.identity, identity);
        assert!(!key_pair.is_hardware_backed());

        // The reconstructed signing key produces signatures the descriptor's
        // public key verifies.
        use p256::ecdsa::signature::Verifier;
        use p256::ecdsa::{Signature, VerifyingKey};
        let der = key_pair.signing_key.sign(b"probe").unwrap();
        let vk = VerifyingKey::from_sec1_bytes(&identity.signing_public_key).unwrap();
        assert!(vk
            .verify(b"probe", &Signature::from_der(&der).unwrap())
            .is_ok());
    }

    #[tokio::test]
    async fn test_update_display_name_keeps_keys() {
        let service = service();
        let before = service.generate("Alice").await.unwrap();

        service.update_display_name("Alice (laptop)").await.unwrap();
        let after = service.load_identity().await.unwrap();

        assert_eq!(after.display_name, "Alice (laptop)");
        assert_eq!(after.user_id, before.user_id);
        assert_eq!(after.encryption_public_key, before.encryption_public_key);
        assert_eq!(after.signing_public_key, before.signing_public_key);
    }

    #[tokio::test]
    async fn test_delete_identity() {
        let service = service();
        service.generate("Alice").await.unwrap();

        service.delete_identity().await.unwrap();
        assert!(!service.has_identity().await);
        // Deleting again is fine: missing items are not errors.
        service.delete_identity().await.unwrap();
    }

    #[tokio::test]
    async fn test_generate_rolls_back_on_storage_failure() {
        let store = Arc::new(FailingStore {
            inner: MemorySecretStore::new(),
            fail_account: SIGNING_KEY_ACCOUNT,
        });
        let service = IdentityService::new(store.clone(), None);

        let result = service.generate("Alice").await;
        assert!(matches!(result, Err(VaultError::IdentityInit(_))));

        // The encryption blob written before the failure was removed.
        assert!(!store.exists(ENCRYPTION_KEY_ACCOUNT).await.unwrap());
        assert!(!store.exists(IDENTITY_ACCOUNT).await.unwrap());
    }

    #[tokio::test]
    async fn test_hardware_provider_roundtrip() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let provider: Arc<dyn HardwareKeyProvider> = Arc::new(FakeEnclave);
        let service = IdentityService::new(Arc::clone(&store), Some(provider));

        service.generate("Alice").await.unwrap();
        let key_pair = service.load_key_pair().await.unwrap();
        assert!(key_pair.is_hardware_backed());

        // The same blobs without the provider must fail, not downgrade.
        let degraded = IdentityService::new(store, None);
        assert!(matches!(
            degraded.load_key_pair().await,
            Err(VaultError::KeyGenerationFailed(_))
        ));
    }
}
