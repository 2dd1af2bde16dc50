//! In-memory cache backend using DashMap

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use tvsync_core::{
    CacheBackend, CacheEntry, CacheScope, CacheStats, ExpirationStrategy, Payload, Result,
    ScopedBackend,
};

/// Configuration for the memory backend
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of entries (0 = unlimited)
    pub max_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self { max_capacity: 0 }
    }
}

/// Internal statistics tracking
#[derive(Debug, Default)]
struct MemoryStats {
    writes: u64,
    deletes: u64,
    evictions: u64,
}

/// Scope -> keys index
type ScopeIndex = DashMap<CacheScope, HashSet<String>>;

/// In-memory cache backend
///
/// Uses `DashMap` so reads and writes from different tasks never corrupt
/// each other. Cloning creates a new handle to the SAME underlying store.
#[derive(Clone)]
pub struct MemoryBackend {
    /// Main data store
    data: Arc<DashMap<String, CacheEntry<Payload>>>,
    /// Scope -> keys index
    scope_index: Arc<ScopeIndex>,
    /// Statistics
    stats: Arc<RwLock<MemoryStats>>,
    /// Configuration
    config: MemoryConfig,
}

impl MemoryBackend {
    /// Create a new memory backend
    pub fn new(config: MemoryConfig) -> Self {
        let initial = match config.max_capacity {
            0 => 64,
            cap => cap.min(10_000),
        };

        Self {
            data: Arc::new(DashMap::with_capacity(initial)),
            scope_index: Arc::new(DashMap::new()),
            stats: Arc::new(RwLock::new(MemoryStats::default())),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Evict the oldest entries if a new key would exceed capacity
    ///
    /// `UntilCleared` entries are never evicted, so a store holding only
    /// those can grow past its capacity.
    fn maybe_evict(&self, incoming: &str) {
        if self.config.max_capacity == 0 || self.data.contains_key(incoming) {
            return;
        }

        let excess = (self.data.len() + 1).saturating_sub(self.config.max_capacity);
        if excess == 0 {
            return;
        }

        // Collect first: removing while iterating a DashMap deadlocks
        let mut by_age: Vec<(Option<DateTime<Utc>>, String)> = self
            .data
            .iter()
            .filter(|entry| entry.strategy != ExpirationStrategy::UntilCleared)
            .map(|entry| (entry.saved_at, entry.key().clone()))
            .collect();
        by_age.sort();

        for (_, key) in by_age.into_iter().take(excess) {
            if self.remove_entry(&key) {
                self.stats.write().evictions += 1;
            }
        }
    }

    /// Remove an entry and clean up indexes
    fn remove_entry(&self, key: &str) -> bool {
        match self.data.remove(key) {
            Some((_, entry)) => {
                if let Some(mut keys) = self.scope_index.get_mut(&entry.scope) {
                    keys.remove(key);
                }
                true
            }
            None => false,
        }
    }

    /// Insert an entry and index it, without touching statistics
    pub(crate) fn insert_entry(&self, entry: CacheEntry<Payload>) {
        let key = entry.key.clone();

        // A key may move between scopes when re-saved
        let previous_scope = self.data.get(&key).map(|previous| previous.scope);
        if let Some(old_scope) = previous_scope.filter(|scope| *scope != entry.scope) {
            if let Some(mut keys) = self.scope_index.get_mut(&old_scope) {
                keys.remove(&key);
            }
        }

        self.scope_index
            .entry(entry.scope)
            .or_default()
            .insert(key.clone());
        self.data.insert(key, entry);
    }

    /// Copy of every stored entry
    pub fn entries(&self) -> Vec<CacheEntry<Payload>> {
        self.data.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of entries removed to stay under capacity
    pub fn evictions(&self) -> u64 {
        self.stats.read().evictions
    }

    /// Get approximate memory usage
    pub fn memory_usage(&self) -> usize {
        self.data.iter().map(|entry| entry.size()).sum()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Payload>>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, entry: CacheEntry<Payload>) -> Result<()> {
        self.maybe_evict(&entry.key);
        self.insert_entry(entry);
        self.stats.write().writes += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.remove_entry(key);
        if removed {
            self.stats.write().deletes += 1;
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.contains_key(key))
    }

    async fn delete_many(&self, keys: &[&str]) -> Result<u64> {
        let mut count = 0;
        for key in keys {
            if self.delete(key).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn clear(&self) -> Result<()> {
        let removed = self.data.len() as u64;
        self.data.clear();
        self.scope_index.clear();
        self.stats.write().deletes += removed;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let stats = self.stats.read();
        Ok(CacheStats {
            writes: stats.writes,
            deletes: stats.deletes,
            size: self.data.len(),
            memory_bytes: self.memory_usage(),
            ..Default::default()
        })
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }
}

#[async_trait]
impl ScopedBackend for MemoryBackend {
    async fn keys_in_scope(&self, scope: CacheScope) -> Result<Vec<String>> {
        match self.scope_index.get(&scope) {
            Some(keys) => Ok(keys.iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_scope(&self, scope: CacheScope) -> Result<u64> {
        let Some((_, keys)) = self.scope_index.remove(&scope) else {
            return Ok(0);
        };

        let mut count = 0;
        for key in keys {
            // The entry may have been replaced under another scope meanwhile
            let still_in_scope = self
                .data
                .get(&key)
                .is_some_and(|entry| entry.scope == scope);
            if still_in_scope && self.data.remove(&key).is_some() {
                count += 1;
            }
        }
        self.stats.write().deletes += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(key: &str, scope: CacheScope) -> CacheEntry<Payload> {
        CacheEntry::new(
            key,
            Payload::new("string", 1, "json", b"\"value\"".to_vec()),
            ExpirationStrategy::fixed_secs(60),
            scope,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_basic_get_set() {
        let backend = MemoryBackend::new(MemoryConfig::default());

        backend.set(entry("key1", CacheScope::Global)).await.unwrap();

        let result = backend.get("key1").await.unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().value.bytes, b"\"value\"".to_vec());
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new(MemoryConfig::default());

        backend.set(entry("key1", CacheScope::Global)).await.unwrap();
        assert!(backend.exists("key1").await.unwrap());

        assert!(backend.delete("key1").await.unwrap());
        assert!(!backend.exists("key1").await.unwrap());
        assert!(!backend.delete("key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let backend = MemoryBackend::new(MemoryConfig::default());
        let result = backend.get("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let backend = MemoryBackend::new(MemoryConfig::default());

        backend.set(entry("key1", CacheScope::Global)).await.unwrap();
        backend.set(entry("key2", CacheScope::User)).await.unwrap();
        assert_eq!(backend.len().await.unwrap(), 2);

        backend.clear().await.unwrap();
        assert_eq!(backend.len().await.unwrap(), 0);
        assert!(backend.keys_in_scope(CacheScope::User).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_scope_keeps_global() {
        let backend = MemoryBackend::new(MemoryConfig::default());

        backend.set(entry("app_config", CacheScope::Global)).await.unwrap();
        backend.set(entry("user_info", CacheScope::User)).await.unwrap();
        backend.set(entry("watch_history", CacheScope::User)).await.unwrap();

        assert_eq!(backend.delete_scope(CacheScope::User).await.unwrap(), 2);
        assert!(backend.exists("app_config").await.unwrap());
        assert!(!backend.exists("user_info").await.unwrap());
        assert!(!backend.exists("watch_history").await.unwrap());
    }

    #[tokio::test]
    async fn test_rescoped_key_is_reindexed() {
        let backend = MemoryBackend::new(MemoryConfig::default());

        backend.set(entry("key", CacheScope::User)).await.unwrap();
        backend.set(entry("key", CacheScope::Global)).await.unwrap();

        assert_eq!(backend.delete_scope(CacheScope::User).await.unwrap(), 0);
        assert!(backend.exists("key").await.unwrap());
        assert_eq!(
            backend.keys_in_scope(CacheScope::Global).await.unwrap(),
            vec!["key".to_string()]
        );
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let backend = MemoryBackend::new(MemoryConfig::with_capacity(2));

        let mut oldest = entry("key1", CacheScope::Global);
        oldest.saved_at = Some(Utc::now() - ChronoDuration::hours(1));
        backend.set(oldest).await.unwrap();
        backend.set(entry("key2", CacheScope::Global)).await.unwrap();
        backend.set(entry("key3", CacheScope::Global)).await.unwrap();

        assert_eq!(backend.len().await.unwrap(), 2);
        assert!(!backend.exists("key1").await.unwrap());
        assert_eq!(backend.evictions(), 1);
    }

    #[tokio::test]
    async fn test_capacity_keeps_until_cleared() {
        let backend = MemoryBackend::new(MemoryConfig::with_capacity(2));

        let mut session = entry("session_user", CacheScope::Global);
        session.strategy = ExpirationStrategy::until_cleared();
        session.saved_at = Some(Utc::now() - ChronoDuration::hours(2));
        backend.set(session).await.unwrap();

        let mut old = entry("key1", CacheScope::Global);
        old.saved_at = Some(Utc::now() - ChronoDuration::hours(1));
        backend.set(old).await.unwrap();
        backend.set(entry("key2", CacheScope::Global)).await.unwrap();

        assert!(backend.exists("session_user").await.unwrap());
        assert!(!backend.exists("key1").await.unwrap());
        assert!(backend.exists("key2").await.unwrap());
        assert_eq!(backend.evictions(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let backend = MemoryBackend::new(MemoryConfig::default());

        backend.set(entry("key1", CacheScope::Global)).await.unwrap();
        backend.delete("key1").await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.size, 0);
    }
}
