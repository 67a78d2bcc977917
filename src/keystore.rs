/// Opaque persistence for private-key blobs and identity metadata.
///
/// Accounts are opaque strings, values opaque blobs. On a real device the
/// backing store is the OS secret store and values are only readable while
/// the device is unlocked; this crate ships a memory store (tests,
/// fallback) and a file store with atomic replace.
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, VaultError};

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Persist a value under an account, replacing any previous value.
    async fn save(&self, account: &str, value: &[u8]) -> Result<()>;

    /// Load the value for an account. Fails with `KeyStoreNotFound` when
    /// the account has no value.
    async fn load(&self, account: &str) -> Result<Vec<u8>>;

    /// Remove an account. Returns Ok even if the account doesn't exist.
    async fn delete(&self, account: &str) -> Result<()>;

    /// Non-throwing existence probe.
    async fn exists(&self, account: &str) -> Result<bool>;
}

/// In-memory secret store.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn save(&self, account: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(account.to_string(), value.to_vec());
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Vec<u8>> {
        self.entries
            .read()
            .await
            .get(account)
            .cloned()
            .ok_or_else(|| VaultError::KeyStoreNotFound(account.to_string()))
    }

    async fn delete(&self, account: &str) -> Result<()> {
        self.entries.write().await.remove(account);
        Ok(())
    }

    async fn exists(&self, account: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(account))
    }
}

/// File-backed secret store: one file per account under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader sees either the old or the new value, never a torn write.
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, account: &str) -> Result<PathBuf> {
        if account.is_empty()
            || account.contains(['/', '\\'])
            || account.contains("..")
        {
            return Err(VaultError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid secret store account name: {account:?}"),
            )));
        }
        Ok(self.root.join(account))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn save(&self, account: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(account)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Vec<u8>> {
        let path = self.path_for(account)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(VaultError::KeyStoreNotFound(account.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, account: &str) -> Result<()> {
        let path = self.path_for(account)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, account: &str) -> Result<bool> {
        let path = self.path_for(account)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
