//! Durable file-backed cache backend
//!
//! Entries live in a `MemoryBackend` mirror; every mutation rewrites the
//! whole store file through a temp file and an atomic rename, so a process
//! killed mid-write leaves either the old or the new file, never a torn one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tvsync_core::{
    CacheBackend, CacheEntry, CacheError, CacheScope, CacheStats, Payload, Result, ScopedBackend,
};

use crate::memory::{MemoryBackend, MemoryConfig};

/// On-disk layout version
const FILE_FORMAT_VERSION: u32 = 1;

/// Configuration for the file backend
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Store file location
    pub path: PathBuf,
    /// Limits of the in-memory mirror
    pub memory: MemoryConfig,
}

impl FileConfig {
    /// Create config for a store file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            memory: MemoryConfig::unlimited(),
        }
    }

    /// Set mirror capacity
    ///
    /// Evicted entries are dropped from the file as well. `UntilCleared`
    /// entries (session token, signed-in user, history) are never evicted.
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.memory = MemoryConfig::with_capacity(capacity);
        self
    }
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    format_version: u32,
    entries: &'a [CacheEntry<Payload>],
}

#[derive(Deserialize)]
struct StoreFile {
    #[serde(default)]
    format_version: u32,
    #[serde(default)]
    entries: Vec<Value>,
}

/// File-backed cache backend
///
/// Cloning creates a new handle to the SAME store file.
#[derive(Clone)]
pub struct FileBackend {
    mirror: MemoryBackend,
    path: Arc<PathBuf>,
    /// Serializes snapshot + write so a later write never loses to an earlier one
    write_lock: Arc<Mutex<()>>,
}

impl FileBackend {
    /// Open (or create) a store file
    ///
    /// A missing file starts an empty store. An unreadable or corrupt file
    /// is moved aside to `<path>.corrupt` and the store starts empty;
    /// individual entries that no longer parse are skipped.
    pub async fn open(config: FileConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mirror = MemoryBackend::new(config.memory.clone());
        let backend = Self {
            mirror,
            path: Arc::new(config.path),
            write_lock: Arc::new(Mutex::new(())),
        };
        backend.load().await?;
        Ok(backend)
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<()> {
        let bytes = match tokio::fs::read(self.path.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "tvsync", path = %self.path.display(), "No store file, starting empty");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let file: StoreFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    target: "tvsync",
                    path = %self.path.display(),
                    error = %e,
                    "Store file is corrupt, starting empty"
                );
                self.quarantine().await;
                return Ok(());
            }
        };

        if file.format_version > FILE_FORMAT_VERSION {
            warn!(
                target: "tvsync",
                found = file.format_version,
                supported = FILE_FORMAT_VERSION,
                "Store file written by a newer version, reading what parses"
            );
        }

        let mut skipped = 0usize;
        for raw in file.entries {
            match serde_json::from_value::<CacheEntry<Payload>>(raw) {
                Ok(entry) => self.mirror.insert_entry(entry),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(target: "tvsync", skipped, "Skipped unreadable store entries");
        }
        debug!(
            target: "tvsync",
            path = %self.path.display(),
            entries = self.mirror.entries().len(),
            "Store file loaded"
        );
        Ok(())
    }

    /// Move a corrupt store file out of the way
    async fn quarantine(&self) {
        let mut aside = self.path.as_os_str().to_owned();
        aside.push(".corrupt");
        if let Err(e) = tokio::fs::rename(self.path.as_ref(), PathBuf::from(aside)).await {
            warn!(target: "tvsync", error = %e, "Could not move corrupt store file aside");
        }
    }

    /// Write the current mirror contents to disk
    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let entries = self.mirror.entries();
        let bytes = serde_json::to_vec(&StoreFileRef {
            format_version: FILE_FORMAT_VERSION,
            entries: &entries,
        })
        .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.path.as_ref()).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Payload>>> {
        self.mirror.get(key).await
    }

    async fn set(&self, entry: CacheEntry<Payload>) -> Result<()> {
        self.mirror.set(entry).await?;
        self.persist().await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let deleted = self.mirror.delete(key).await?;
        if deleted {
            self.persist().await?;
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.mirror.exists(key).await
    }

    async fn delete_many(&self, keys: &[&str]) -> Result<u64> {
        let count = self.mirror.delete_many(keys).await?;
        if count > 0 {
            self.persist().await?;
        }
        Ok(count)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.mirror.keys().await
    }

    async fn clear(&self) -> Result<()> {
        self.mirror.clear().await?;
        self.persist().await
    }

    async fn stats(&self) -> Result<CacheStats> {
        self.mirror.stats().await
    }

    async fn len(&self) -> Result<usize> {
        self.mirror.len().await
    }
}

#[async_trait]
impl ScopedBackend for FileBackend {
    async fn keys_in_scope(&self, scope: CacheScope) -> Result<Vec<String>> {
        self.mirror.keys_in_scope(scope).await
    }

    async fn delete_scope(&self, scope: CacheScope) -> Result<u64> {
        let count = self.mirror.delete_scope(scope).await?;
        if count > 0 {
            self.persist().await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tvsync_core::ExpirationStrategy;

    fn entry(key: &str, scope: CacheScope) -> CacheEntry<Payload> {
        CacheEntry::new(
            key,
            Payload::new("string", 1, "json", b"\"CCTV-1\"".to_vec()),
            ExpirationStrategy::until_cleared(),
            scope,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("store.json");

        let backend = FileBackend::open(FileConfig::new(&path)).await.unwrap();
        backend.set(entry("session_token", CacheScope::User)).await.unwrap();
        backend.set(entry("app_config", CacheScope::Global)).await.unwrap();
        drop(backend);

        let reopened = FileBackend::open(FileConfig::new(&path)).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        let restored = reopened.get("session_token").await.unwrap().unwrap();
        assert_eq!(restored.scope, CacheScope::User);
        assert_eq!(restored.value.bytes, b"\"CCTV-1\"".to_vec());
    }

    #[tokio::test]
    async fn test_delete_scope_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let backend = FileBackend::open(FileConfig::new(&path)).await.unwrap();
        backend.set(entry("user_info", CacheScope::User)).await.unwrap();
        backend.set(entry("app_config", CacheScope::Global)).await.unwrap();
        assert_eq!(backend.delete_scope(CacheScope::User).await.unwrap(), 1);

        let reopened = FileBackend::open(FileConfig::new(&path)).await.unwrap();
        assert!(!reopened.exists("user_info").await.unwrap());
        assert!(reopened.exists("app_config").await.unwrap());
    }

    #[tokio::test]
    async fn test_eviction_spares_until_cleared_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let backend = FileBackend::open(FileConfig::new(&path).max_capacity(2))
            .await
            .unwrap();
        backend.set(entry("session_user", CacheScope::Global)).await.unwrap();
        for key in ["catalog_a", "catalog_b", "catalog_c"] {
            let mut cached = entry(key, CacheScope::Global);
            cached.strategy = ExpirationStrategy::fixed_secs(3600);
            backend.set(cached).await.unwrap();
        }
        drop(backend);

        let reopened = FileBackend::open(FileConfig::new(&path)).await.unwrap();
        assert!(reopened.exists("session_user").await.unwrap());
        assert!(reopened.exists("catalog_c").await.unwrap());
        assert!(!reopened.exists("catalog_a").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let backend = FileBackend::open(FileConfig::new(&path)).await.unwrap();
        assert!(backend.is_empty().await.unwrap());
        assert!(dir.path().join("store.json.corrupt").exists());

        // The store keeps working after recovery
        backend.set(entry("key", CacheScope::Global)).await.unwrap();
        assert!(backend.exists("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let good = serde_json::to_value(entry("good", CacheScope::Global)).unwrap();
        let file = serde_json::json!({
            "format_version": 1,
            "entries": [good, { "key": "bad", "value": 42 }]
        });
        tokio::fs::write(&path, serde_json::to_vec(&file).unwrap())
            .await
            .unwrap();

        let backend = FileBackend::open(FileConfig::new(&path)).await.unwrap();
        assert_eq!(backend.keys().await.unwrap(), vec!["good".to_string()]);
    }
}
