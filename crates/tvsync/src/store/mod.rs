//! Typed cache store
//!
//! `CacheStore` turns a byte-oriented `ScopedBackend` into typed storage:
//! values are written as tagged, versioned payloads and read back through
//! the value type's `CacheValue` decode path. Reads never fail; an entry
//! that cannot be decoded even leniently is purged and reported as a miss.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use tvsync_core::{
    CacheEntry, CacheKey, CacheMetrics, CacheOperation, CacheResult, CacheScope, CacheStats,
    CacheValue, Clock, ExpirationStrategy, FieldSnapshot, JsonSerializer, NoopMetrics, Payload,
    PurgeReason, RefreshPolicy, Result, ScopedBackend, Serializer, SystemClock, decode_value,
};

use crate::coalescer::SingleFlight;
use crate::config::StoreConfig;

mod field;
mod read_through;

pub use field::FieldCheck;
pub use read_through::{Loader, ReadThroughCache};

/// Undecoded value read through `CacheStore::get_raw`
#[derive(Debug, Clone, PartialEq)]
pub struct RawValue {
    /// Type tag the value was written with
    pub type_tag: String,
    /// Schema version the value was written with
    pub version: u32,
    /// The value as generic JSON
    pub value: serde_json::Value,
}

/// Counters kept by the store itself; backends count writes and deletes
#[derive(Debug, Default)]
struct StoreCounters {
    hits: u64,
    misses: u64,
    stale_hits: u64,
    purges: u64,
    migrations: u64,
}

/// A key with its namespace, scope and policies resolved
#[derive(Debug, Clone)]
struct ResolvedKey {
    full: String,
    scope: CacheScope,
    strategy: Option<ExpirationStrategy>,
    policy: RefreshPolicy,
}

enum Decoded<T> {
    Current(T),
    Migrated(T),
    Corrupt(String),
}

/// Typed cache with expiration, scopes and lenient decoding
///
/// Generic over:
/// - `B`: The storage backend (Memory, File)
/// - `S`: The serializer used for writes (JSON, MessagePack)
/// - `M`: The metrics collector
pub struct CacheStore<B, S = JsonSerializer, M = NoopMetrics>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    backend: Arc<B>,
    serializer: Arc<S>,
    metrics: Arc<M>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    counters: Arc<Mutex<StoreCounters>>,
    loads: SingleFlight<Result<CacheEntry<Payload>>>,
}

// Constructors for default serializer/metrics
impl<B: ScopedBackend> CacheStore<B, JsonSerializer, NoopMetrics> {
    /// Create a store with the JSON serializer and no metrics
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    /// Create with custom config
    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self::with_serializer_and_metrics(backend, JsonSerializer, NoopMetrics, config)
    }
}

impl<B, S, M> CacheStore<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    /// Create a store with custom serializer and metrics
    pub fn with_serializer_and_metrics(
        backend: B,
        serializer: S,
        metrics: M,
        config: StoreConfig,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            serializer: Arc::new(serializer),
            metrics: Arc::new(metrics),
            clock: Arc::new(SystemClock),
            config,
            counters: Arc::new(Mutex::new(StoreCounters::default())),
            loads: SingleFlight::new(),
        }
    }

    /// Replace the clock used to stamp and judge entries
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The clock this store stamps entries with
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// The underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn resolve<K: CacheKey + ?Sized>(&self, key: &K) -> ResolvedKey {
        let full = match &self.config.namespace {
            Some(ns) => format!("{}:{}", ns, key.full_key()),
            None => key.full_key(),
        };
        ResolvedKey {
            full,
            scope: key.scope(),
            strategy: key.strategy(),
            policy: key.refresh_policy(),
        }
    }

    /// Save a value
    ///
    /// `strategy` overrides the key's own; with neither, the configured
    /// default applies. Jitter is resolved here, once per save.
    pub async fn save<K, T>(
        &self,
        key: K,
        value: &T,
        strategy: impl Into<Option<ExpirationStrategy>>,
    ) -> Result<()>
    where
        K: CacheKey,
        T: CacheValue,
    {
        let key = self.resolve(&key);
        let payload = self.encode(value)?;
        self.put(&key, payload, strategy.into(), None).await?;
        Ok(())
    }

    /// Get a typed value
    ///
    /// Expired entries read as `Miss` under `BlockUntilFresh` and as
    /// `Stale` under `StaleWhileRevalidate`.
    pub async fn get<T: CacheValue>(&self, key: impl CacheKey) -> CacheResult<T> {
        let key = self.resolve(&key);
        let start = Instant::now();
        let result = self.read(&key).await;
        self.metrics
            .record_latency(CacheOperation::Get, start.elapsed());
        result
    }

    /// Get a value without committing to a type
    pub async fn get_raw(&self, key: impl CacheKey) -> Option<RawValue> {
        let key = self.resolve(&key);
        let entry = self.fetch(&key).await?;

        if entry.is_expired_at(self.clock.now()) && key.policy == RefreshPolicy::BlockUntilFresh {
            return None;
        }

        match decode_value(&entry.value.format, &entry.value.bytes) {
            Ok(value) => Some(RawValue {
                type_tag: entry.value.type_tag,
                version: entry.value.version,
                value,
            }),
            Err(e) => {
                warn!(target: "tvsync", key = %key.full, error = %e, "Undecodable cache entry");
                self.purge(&key.full, PurgeReason::Corrupt).await;
                None
            }
        }
    }

    /// Check if a key holds an unexpired entry
    pub async fn is_valid(&self, key: impl CacheKey) -> bool {
        let key = self.resolve(&key);
        match self.fetch(&key).await {
            Some(entry) => entry.is_valid_at(self.clock.now()),
            None => false,
        }
    }

    /// Remove one key
    pub async fn clear(&self, key: impl CacheKey) -> Result<bool> {
        let key = self.resolve(&key);
        let start = Instant::now();
        let removed = self.backend.delete(&key.full).await?;
        self.metrics
            .record_latency(CacheOperation::Clear, start.elapsed());
        Ok(removed)
    }

    /// Remove every entry
    pub async fn clear_all(&self) -> Result<()> {
        self.backend.clear().await?;
        debug!(target: "tvsync", "Cleared cache");
        Ok(())
    }

    /// Remove every user-scoped entry, keeping global ones
    pub async fn clear_user_scoped(&self) -> Result<u64> {
        let start = Instant::now();
        let removed = self.backend.delete_scope(CacheScope::User).await?;
        self.metrics
            .record_latency(CacheOperation::Invalidate, start.elapsed());
        debug!(target: "tvsync", removed, "Cleared user-scoped entries");
        Ok(removed)
    }

    /// Get cache statistics
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = self.backend.stats().await?;
        {
            let counters = self.counters.lock();
            stats.hits += counters.hits;
            stats.misses += counters.misses;
            stats.stale_hits += counters.stale_hits;
            stats.purges += counters.purges;
            stats.migrations += counters.migrations;
        }
        self.metrics.record_size(stats.size, stats.memory_bytes);
        Ok(stats)
    }

    /// Get the number of entries
    pub async fn len(&self) -> Result<usize> {
        self.backend.len().await
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> Result<bool> {
        self.backend.is_empty().await
    }

    fn encode<T: CacheValue>(&self, value: &T) -> Result<Payload> {
        let start = Instant::now();
        let bytes = self.serializer.serialize(value)?;
        self.metrics
            .record_latency(CacheOperation::Serialize, start.elapsed());
        Ok(Payload::new(
            T::TYPE_TAG,
            T::VERSION,
            self.serializer.name(),
            bytes,
        ))
    }

    async fn put(
        &self,
        key: &ResolvedKey,
        payload: Payload,
        strategy: Option<ExpirationStrategy>,
        snapshot: Option<FieldSnapshot>,
    ) -> Result<CacheEntry<Payload>> {
        let strategy = strategy
            .or(key.strategy)
            .unwrap_or(self.config.default_strategy);

        let mut entry = CacheEntry::new(
            key.full.clone(),
            payload,
            strategy,
            key.scope,
            self.clock.now(),
        );
        entry.snapshot = snapshot;

        let start = Instant::now();
        self.backend.set(entry.clone()).await?;
        self.metrics
            .record_latency(CacheOperation::Save, start.elapsed());

        debug!(
            target: "tvsync",
            key = %key.full,
            scope = key.scope.as_str(),
            ttl_secs = entry.ttl().map(|ttl| ttl.as_secs()),
            "Saved cache entry"
        );
        Ok(entry)
    }

    /// Load the stored entry, dropping ones that lack a timestamp
    async fn fetch(&self, key: &ResolvedKey) -> Option<CacheEntry<Payload>> {
        match self.backend.get(&key.full).await {
            Ok(Some(entry)) if entry.saved_at.is_none() => {
                self.purge(&key.full, PurgeReason::MissingTimestamp).await;
                None
            }
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: "tvsync", key = %key.full, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn read<T: CacheValue>(&self, key: &ResolvedKey) -> CacheResult<T> {
        let Some(entry) = self.fetch(key).await else {
            return self.miss(key);
        };

        let expired = entry.is_expired_at(self.clock.now());
        if expired && key.policy == RefreshPolicy::BlockUntilFresh {
            return self.miss(key);
        }

        let Some(entry) = self.decode_entry::<T>(key, entry).await else {
            return self.miss(key);
        };

        if expired {
            self.counters.lock().stale_hits += 1;
            self.metrics.record_stale_hit(&key.full);
            CacheResult::Stale(entry)
        } else {
            self.counters.lock().hits += 1;
            self.metrics.record_hit(&key.full, key.scope);
            CacheResult::Hit(entry)
        }
    }

    fn miss<T>(&self, key: &ResolvedKey) -> CacheResult<T> {
        self.counters.lock().misses += 1;
        self.metrics.record_miss(&key.full);
        CacheResult::Miss
    }

    async fn decode_entry<T: CacheValue>(
        &self,
        key: &ResolvedKey,
        entry: CacheEntry<Payload>,
    ) -> Option<CacheEntry<T>> {
        match self.decode::<T>(&entry.value) {
            Decoded::Current(value) => Some(entry.map(|_| value)),
            Decoded::Migrated(value) => {
                self.counters.lock().migrations += 1;
                self.metrics.record_migration(&key.full, entry.value.version);
                debug!(
                    target: "tvsync",
                    key = %key.full,
                    from_tag = %entry.value.type_tag,
                    from_version = entry.value.version,
                    to_version = T::VERSION,
                    "Migrated cache entry"
                );

                // Only rewrite entries that were written as this very type
                if entry.value.type_tag == T::TYPE_TAG {
                    self.upgrade(&entry, &value).await;
                }
                Some(entry.map(|_| value))
            }
            Decoded::Corrupt(reason) => {
                warn!(target: "tvsync", key = %key.full, error = %reason, "Undecodable cache entry");
                self.purge(&key.full, PurgeReason::Corrupt).await;
                None
            }
        }
    }

    /// Strict decode first, then lenient re-coercion through generic JSON
    fn decode<T: CacheValue>(&self, payload: &Payload) -> Decoded<T> {
        let start = Instant::now();

        if payload.matches(T::TYPE_TAG, T::VERSION) && payload.format == self.serializer.name() {
            if let Ok(value) = self.serializer.deserialize::<T>(&payload.bytes) {
                self.metrics
                    .record_latency(CacheOperation::Deserialize, start.elapsed());
                return Decoded::Current(value);
            }
        }

        let generic = match decode_value(&payload.format, &payload.bytes) {
            Ok(generic) => generic,
            Err(e) => return Decoded::Corrupt(e.to_string()),
        };

        let result = match T::migrate(&payload.type_tag, payload.version, generic) {
            Some(value) => Decoded::Migrated(value),
            None => Decoded::Corrupt(format!(
                "cannot read {} v{} as {} v{}",
                payload.type_tag,
                payload.version,
                T::TYPE_TAG,
                T::VERSION
            )),
        };
        self.metrics
            .record_latency(CacheOperation::Deserialize, start.elapsed());
        result
    }

    /// Rewrite a migrated entry in the current shape, keeping its timestamps
    async fn upgrade<T: CacheValue>(&self, entry: &CacheEntry<Payload>, value: &T) {
        let payload = match self.encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "tvsync", key = %entry.key, error = %e, "Could not re-encode migrated entry");
                return;
            }
        };

        let mut upgraded = entry.clone();
        upgraded.value = payload;
        if let Err(e) = self.backend.set(upgraded).await {
            warn!(target: "tvsync", key = %entry.key, error = %e, "Could not rewrite migrated entry");
        }
    }

    async fn purge(&self, full_key: &str, reason: PurgeReason) {
        self.counters.lock().purges += 1;
        self.metrics.record_purge(full_key, reason);
        if let Err(e) = self.backend.delete(full_key).await {
            warn!(target: "tvsync", key = full_key, error = %e, "Could not purge cache entry");
        }
    }
}

impl<B, S, M> Clone for CacheStore<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            serializer: self.serializer.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            counters: self.counters.clone(),
            loads: self.loads.clone(),
        }
    }
}
