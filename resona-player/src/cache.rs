//! Local cache store for offline downloads
//!
//! A content-addressable blob store keyed by track id. The download
//! manager is the only writer; playback only checks existence and reads
//! bytes back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Handle to a stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    /// Track id the blob is keyed by
    pub id: String,
    /// Stored size in bytes
    pub len: u64,
    /// On-disk location, when the store is filesystem-backed
    pub path: Option<PathBuf>,
}

/// Content-addressable blob store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store bytes under `id`, replacing any existing entry
    async fn put(&self, id: &str, bytes: Bytes) -> Result<BlobHandle>;

    /// Read a blob back, or None on miss
    async fn get(&self, id: &str) -> Result<Option<Bytes>>;

    /// Remove a blob. Returns true when an entry existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Whether a blob exists for `id`
    async fn contains(&self, id: &str) -> bool;

    /// Total bytes held across all entries
    async fn size(&self) -> Result<u64>;
}

/// Track ids come from an external catalog; refuse anything that could
/// escape the store root when used as a file name.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
    {
        return Err(Error::Storage(format!("invalid cache key: {id:?}")));
    }
    Ok(())
}

/// Filesystem-backed store: one file per track id under a root directory
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::Storage(format!("create cache root {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.blob"))
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn put(&self, id: &str, bytes: Bytes) -> Result<BlobHandle> {
        validate_id(id)?;
        let path = self.blob_path(id);
        // Write to a temp name then rename, so readers never observe a
        // partially written blob
        let tmp = self.root.join(format!("{id}.partial"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::Storage(format!("write blob {id}: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("publish blob {id}: {e}")))?;
        Ok(BlobHandle {
            id: id.to_string(),
            len: bytes.len() as u64,
            path: Some(path),
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Bytes>> {
        validate_id(id)?;
        match tokio::fs::read(self.blob_path(id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read blob {id}: {e}"))),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        match tokio::fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Storage(format!("delete blob {id}: {e}"))),
        }
    }

    async fn contains(&self, id: &str) -> bool {
        validate_id(id).is_ok() && tokio::fs::try_exists(self.blob_path(id)).await.unwrap_or(false)
    }

    async fn size(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::Storage(format!("scan cache root: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("scan cache root: {e}")))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "blob") {
                if let Ok(meta) = entry.metadata().await {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}

/// In-memory store used in tests and as a session-scoped cache
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn put(&self, id: &str, bytes: Bytes) -> Result<BlobHandle> {
        validate_id(id)?;
        let len = bytes.len() as u64;
        self.entries.write().await.insert(id.to_string(), bytes);
        Ok(BlobHandle {
            id: id.to_string(),
            len,
            path: None,
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    async fn size(&self) -> Result<u64> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .map(|b| b.len() as u64)
            .sum())
    }
}
