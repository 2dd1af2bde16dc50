//! Cache backend trait

use async_trait::async_trait;
use crate::{CacheEntry, CacheError, CacheScope, CacheStats, Payload};

/// Core trait for all cache storage backends
///
/// Backends store entries verbatim. Expiry is decided by the store, which
/// owns the clock, so a backend never drops an entry on its own.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Get an entry from the cache
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Payload>>, CacheError>;

    /// Insert or replace an entry
    ///
    /// Returns once the entry is as durable as the backend can make it.
    async fn set(&self, entry: CacheEntry<Payload>) -> Result<(), CacheError>;

    /// Delete a key from the cache
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Check if a key exists in the cache
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete multiple keys
    ///
    /// Returns the number of keys that were deleted.
    async fn delete_many(&self, keys: &[&str]) -> Result<u64, CacheError>;

    /// All stored keys
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Clear all entries from the cache
    async fn clear(&self) -> Result<(), CacheError>;

    /// Get cache statistics
    async fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Get the number of entries in the cache
    async fn len(&self) -> Result<usize, CacheError>;

    /// Check if the cache is empty
    async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}

/// Extended trait for backends that can select entries by scope
#[async_trait]
pub trait ScopedBackend: CacheBackend {
    /// Get all keys saved under a scope
    async fn keys_in_scope(&self, scope: CacheScope) -> Result<Vec<String>, CacheError>;

    /// Delete all entries saved under a scope
    async fn delete_scope(&self, scope: CacheScope) -> Result<u64, CacheError>;
}
