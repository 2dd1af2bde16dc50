//! Read-through loading
//!
//! `get_or_load` follows the key's refresh policy: under
//! `BlockUntilFresh` a miss or expired entry awaits the loader, under
//! `StaleWhileRevalidate` an expired entry is returned as `Stale` while a
//! single background refresh runs. Concurrent loads of one key share a
//! single loader call.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use tvsync_core::{
    CacheError, CacheKey, CacheMetrics, CacheResult, CacheValue, Result, ScopedBackend, Serializer,
};

use super::{CacheStore, Decoded, ResolvedKey};

/// Source of truth consulted on cache misses
#[async_trait]
pub trait Loader<K, V>: Send + Sync + 'static {
    /// Load data for the given key; `None` means the source has nothing
    async fn load(&self, key: &K) -> Result<Option<V>>;
}

impl<B, S, M> CacheStore<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    /// Get a value, loading and saving it when the cache cannot serve it
    pub async fn get_or_load<K, T, F, Fut>(&self, key: K, loader: F) -> Result<CacheResult<T>>
    where
        K: CacheKey,
        T: CacheValue + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = self.resolve(&key);

        match self.read::<T>(&key).await {
            CacheResult::Hit(entry) => return Ok(CacheResult::Hit(entry)),
            CacheResult::Stale(entry) => {
                self.spawn_refresh(&key, loader);
                return Ok(CacheResult::Stale(entry));
            }
            CacheResult::Miss => {}
        }

        let store = self.clone();
        let leader_key = key.clone();
        let entry = self
            .loads
            .run(&key.full, move || async move {
                let value = loader().await?;
                let payload = store.encode(&value)?;
                store.put(&leader_key, payload, None, None).await
            })
            .await?;

        // Every waiter decodes the shared payload into its own value
        match self.decode::<T>(&entry.value) {
            Decoded::Current(value) | Decoded::Migrated(value) => {
                Ok(CacheResult::Hit(entry.map(|_| value)))
            }
            Decoded::Corrupt(reason) => Err(CacheError::Deserialization(reason)),
        }
    }

    fn spawn_refresh<T, F, Fut>(&self, key: &ResolvedKey, loader: F)
    where
        T: CacheValue + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let store = self.clone();
        let key = key.clone();
        let refresh_key = key.full.clone();

        self.loads.try_spawn(&refresh_key, move || async move {
            let saved = match loader().await {
                Ok(value) => match store.encode(&value) {
                    Ok(payload) => store.put(&key, payload, None, None).await.map(|_| ()),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            if let Err(e) = saved {
                warn!(target: "tvsync", key = %key.full, error = %e, "Background refresh failed");
            }
        });
    }

    /// Wrap this store with a loader
    pub fn read_through<K, V, L>(&self, loader: L) -> ReadThroughCache<K, V, L, B, S, M>
    where
        K: CacheKey + Clone + Send + Sync + 'static,
        V: CacheValue + 'static,
        L: Loader<K, V>,
    {
        ReadThroughCache::new(self.clone(), loader)
    }
}

/// A cache that loads data automatically on miss
pub struct ReadThroughCache<K, V, L, B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    store: CacheStore<B, S, M>,
    loader: Arc<L>,
    _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V, L, B, S, M> ReadThroughCache<K, V, L, B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
    K: CacheKey + Clone + Send + Sync + 'static,
    V: CacheValue + 'static,
    L: Loader<K, V>,
{
    /// Create a new ReadThroughCache
    pub fn new(store: CacheStore<B, S, M>, loader: L) -> Self {
        Self {
            store,
            loader: Arc::new(loader),
            _phantom: PhantomData,
        }
    }

    /// Get value from cache, or load it if missing
    pub async fn get(&self, key: K) -> Result<Option<V>> {
        let loader = self.loader.clone();
        let load_key = key.clone();

        let result = self
            .store
            .get_or_load(key, move || async move {
                loader
                    .load(&load_key)
                    .await?
                    .ok_or_else(|| CacheError::NotFound(load_key.full_key()))
            })
            .await;

        match result {
            Ok(found) => Ok(found.value()),
            Err(CacheError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Force refresh a key using the loader
    ///
    /// Returns `true` if the loader produced a value.
    pub async fn refresh(&self, key: K) -> Result<bool> {
        match self.loader.load(&key).await? {
            Some(value) => {
                self.store.save(key, &value, None).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
