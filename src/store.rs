/// Pluggable persistence collaborators.
///
/// The engine only ever hands these encrypted bytes; implementations never
/// see plaintext. The blob store holds the framed container files keyed by
/// file id, independently of the metadata index that backs browsing and
/// search.
use std::collections::HashMap;
use std::io::ErrorKind;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Device-to-device sync state of a vault file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Exists only on this device.
    Local,
    /// Queued for transfer.
    Pending,
    /// Present on all paired devices.
    Synced,
}

/// Lightweight metadata record for one encrypted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFile {
    pub id: Uuid,
    pub name: String,
    pub content_type: String,
    /// Original plaintext size in bytes.
    pub size: u64,
    pub sync_status: SyncStatus,
    /// None for the vault root.
    pub folder: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for encrypted container bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store (or replace) the encrypted bytes for a file.
    async fn put(&self, file_id: Uuid, bytes: &[u8]) -> Result<()>;

    /// Fetch the encrypted bytes for a file.
    async fn get(&self, file_id: Uuid) -> Result<Vec<u8>>;

    /// Remove a file's bytes. Ok even if absent.
    async fn delete(&self, file_id: Uuid) -> Result<()>;
}

/// Queryable index over `VaultFile` records.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    async fn upsert(&self, file: VaultFile) -> Result<()>;

    async fn by_id(&self, id: Uuid) -> Result<Option<VaultFile>>;

    /// All files in a folder (None = vault root), in insertion order.
    async fn by_folder(&self, folder: Option<&str>) -> Result<Vec<VaultFile>>;

    /// Case-insensitive substring search over file names.
    async fn search(&self, name_query: &str) -> Result<Vec<VaultFile>>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, file_id: Uuid, bytes: &[u8]) -> Result<()> {
        self.blobs.write().await.insert(file_id, bytes.to_vec());
        Ok(())
    }

    async fn get(&self, file_id: Uuid) -> Result<Vec<u8>> {
        self.blobs.read().await.get(&file_id).cloned().ok_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, format!("no blob for {file_id}")).into()
        })
    }

    async fn delete(&self, file_id: Uuid) -> Result<()> {
        self.blobs.write().await.remove(&file_id);
        Ok(())
    }
}

/// In-memory metadata index.
#[derive(Default)]
pub struct MemoryMetadataIndex {
    files: RwLock<Vec<VaultFile>>,
}

impl MemoryMetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataIndex for MemoryMetadataIndex {
    async fn upsert(&self, file: VaultFile) -> Result<()> {
        let mut files = self.files.write().await;
        match files.iter_mut().find(|f| f.id == file.id) {
            Some(existing) => *existing = file,
            None => files.push(file),
        }
        Ok(())
    }

    async fn by_id(&self, id: Uuid) -> Result<Option<VaultFile>> {
        Ok(self.files.read().await.iter().find(|f| f.id == id).cloned())
    }

    async fn by_folder(&self, folder: Option<&str>) -> Result<Vec<VaultFile>> {
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|f| f.folder.as_deref() == folder)
            .cloned()
            .collect())
    }

    async fn search(&self, name_query: &str) -> Result<Vec<VaultFile>> {
        let query = name_query.to_lowercase();
        Ok(self
            .files
            .read()
            .await
            .iter()
            .filter(|f| f.name.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.files.write().await.retain(|f| f.id != id);
        Ok(())
    }
}
