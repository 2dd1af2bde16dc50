//! In-memory watch-history buffer backed by the cache store

use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tvsync_core::{
    CacheMetrics, CacheResult, Clock, ExpirationStrategy, JsonSerializer, NoopMetrics, Result,
    ScopedBackend, Serializer,
};

use super::model::{
    HistoryPage, NewWatchRecord, PersistedHistory, SortBy, TimeRange, WatchHistoryItem,
    WatchStatistics,
};
use super::{query, stats};
use crate::config::HistoryConfig;
use crate::store::CacheStore;

#[derive(Debug, Default)]
struct BufferState {
    /// Newest first
    items: Vec<WatchHistoryItem>,
    /// Leading items not yet uploaded
    unsynced: usize,
    last_synced_at: Option<DateTime<Utc>>,
    statistics: WatchStatistics,
    /// Bumped on clear so stale acknowledgements are ignored
    epoch: u64,
    user_id: Option<String>,
}

impl BufferState {
    fn from_persisted(history: PersistedHistory) -> Self {
        let mut state = Self {
            unsynced: history.unsynced.min(history.items.len()),
            items: history.items,
            last_synced_at: history.last_synced_at,
            ..Default::default()
        };
        state.recompute();
        state
    }

    fn to_persisted(&self) -> PersistedHistory {
        PersistedHistory {
            items: self.items.clone(),
            unsynced: self.unsynced,
            last_synced_at: self.last_synced_at,
        }
    }

    fn recompute(&mut self) {
        self.statistics = stats::compute(&self.items);
    }
}

/// Items taken for one upload
#[derive(Debug, Clone)]
pub struct PendingBatch {
    /// Oldest first
    pub items: Vec<WatchHistoryItem>,
    epoch: u64,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Watch-history buffer
///
/// Reads and appends may come from any task. Mutations that persist are
/// serialized so the durable list never goes backwards. Cloning creates a
/// new handle to the SAME buffer.
pub struct HistoryBuffer<B, S = JsonSerializer, M = NoopMetrics>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    store: CacheStore<B, S, M>,
    clock: Arc<dyn Clock>,
    config: HistoryConfig,
    state: Arc<RwLock<BufferState>>,
    persist_lock: Arc<Mutex<()>>,
}

impl<B, S, M> HistoryBuffer<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    /// Create a buffer without reading persisted history
    pub fn empty(store: CacheStore<B, S, M>, config: HistoryConfig) -> Self {
        Self {
            clock: store.clock(),
            store,
            config,
            state: Arc::new(RwLock::new(BufferState::default())),
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load persisted history
    ///
    /// Bounded by `HistoryConfig::load_timeout`; if the read stalls or the
    /// stored list is unreadable the buffer starts empty.
    pub async fn load(store: CacheStore<B, S, M>, config: HistoryConfig) -> Self {
        let buffer = Self::empty(store, config);

        let read = buffer.store.get::<PersistedHistory>(buffer.config.key.clone());
        let state = match tokio::time::timeout(buffer.config.load_timeout, read).await {
            Ok(CacheResult::Hit(entry)) | Ok(CacheResult::Stale(entry)) => {
                BufferState::from_persisted(entry.value)
            }
            Ok(CacheResult::Miss) => BufferState::default(),
            Err(_) => {
                warn!(
                    target: "tvsync",
                    timeout_ms = buffer.config.load_timeout.as_millis() as u64,
                    "History load timed out, starting empty"
                );
                BufferState::default()
            }
        };

        info!(
            target: "tvsync",
            items = state.items.len(),
            unsynced = state.unsynced,
            "History loaded"
        );
        *buffer.state.write() = state;
        buffer
    }

    /// Record a finished watch segment
    ///
    /// The item stays in memory (and pending upload) even when persisting
    /// fails; the error is returned so the caller can log it.
    pub async fn append(&self, record: NewWatchRecord) -> Result<WatchHistoryItem> {
        let _guard = self.persist_lock.lock().await;
        let now = self.clock.now();
        let watched = i64::try_from(record.duration)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .unwrap_or_else(ChronoDuration::zero);

        let (item, snapshot) = {
            let mut state = self.state.write();
            let item = WatchHistoryItem {
                id: Uuid::now_v7().to_string(),
                channel_name: record.channel_name,
                channel_url: record.channel_url,
                duration: record.duration,
                watch_start: now.checked_sub_signed(watched).unwrap_or(now),
                watch_end: Some(now),
                user_id: state.user_id.clone(),
            };
            state.items.insert(0, item.clone());
            state.unsynced += 1;
            state.recompute();
            (item, state.to_persisted())
        };

        debug!(
            target: "tvsync",
            channel = %item.channel_name,
            duration = item.duration,
            "History item appended"
        );
        self.persist(&snapshot).await?;
        Ok(item)
    }

    /// Filtered, sorted, paginated history plus statistics of the filtered set
    pub fn query(
        &self,
        range: TimeRange,
        sort: SortBy,
        page: usize,
        page_size: usize,
    ) -> HistoryPage {
        let now = self.clock.now().with_timezone(&Local);
        let state = self.state.read();
        query::run(&state.items, range, sort, page, page_size, &now)
    }

    /// Drop every item
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        {
            let mut state = self.state.write();
            state.items.clear();
            state.unsynced = 0;
            state.epoch += 1;
            state.recompute();
        }
        self.store.clear(self.config.key.clone()).await?;
        info!(target: "tvsync", "History cleared");
        Ok(())
    }

    /// Check if any item awaits upload
    pub fn has_pending_changes(&self) -> bool {
        self.state.read().unsynced > 0
    }

    /// Number of items awaiting upload
    pub fn unsynced_count(&self) -> usize {
        self.state.read().unsynced
    }

    /// Snapshot of the items awaiting upload
    pub fn pending_batch(&self) -> Option<PendingBatch> {
        let state = self.state.read();
        if state.unsynced == 0 {
            return None;
        }

        let mut items: Vec<WatchHistoryItem> =
            state.items.iter().take(state.unsynced).cloned().collect();
        items.reverse();
        Some(PendingBatch {
            items,
            epoch: state.epoch,
        })
    }

    /// Acknowledge an uploaded batch
    ///
    /// Items appended after the batch was taken stay pending. A batch taken
    /// before the last `clear` is ignored.
    pub async fn mark_batch_synced(&self, batch: &PendingBatch) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut state = self.state.write();
            if state.epoch != batch.epoch {
                debug!(target: "tvsync", "History cleared during upload, ignoring acknowledgement");
                return Ok(());
            }
            state.unsynced = state.unsynced.saturating_sub(batch.len());
            state.last_synced_at = Some(self.clock.now());
            state.to_persisted()
        };
        self.persist(&snapshot).await
    }

    /// Acknowledge every item
    pub async fn mark_synced(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut state = self.state.write();
            state.unsynced = 0;
            state.last_synced_at = Some(self.clock.now());
            state.to_persisted()
        };
        self.persist(&snapshot).await
    }

    /// Set the user stamped on new items
    pub fn set_user(&self, user_id: Option<String>) {
        self.state.write().user_id = user_id;
    }

    /// The user stamped on new items
    pub fn user_id(&self) -> Option<String> {
        self.state.read().user_id.clone()
    }

    /// Statistics over every item
    pub fn statistics(&self) -> WatchStatistics {
        self.state.read().statistics.clone()
    }

    /// Every item, newest first
    pub fn items(&self) -> Vec<WatchHistoryItem> {
        self.state.read().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// When a batch was last acknowledged
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_synced_at
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// The store the history is persisted in
    pub fn store(&self) -> &CacheStore<B, S, M> {
        &self.store
    }

    async fn persist(&self, snapshot: &PersistedHistory) -> Result<()> {
        self.store
            .save(
                self.config.key.clone(),
                snapshot,
                ExpirationStrategy::UntilCleared,
            )
            .await
    }
}

impl<B, S, M> Clone for HistoryBuffer<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            persist_lock: self.persist_lock.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tvsync_core::{
        CacheBackend, CacheEntry, CacheScope, CacheStats, ExpirationStrategy, ManualClock, Payload,
    };
    use tvsync_storage::{MemoryBackend, MemoryConfig};
    use crate::keys::AppCacheKey;

    fn store() -> (CacheStore<MemoryBackend>, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = CacheStore::new(MemoryBackend::new(MemoryConfig::default()))
            .with_clock(clock.clone());
        (store, clock)
    }

    fn record(channel: &str, duration: u64) -> NewWatchRecord {
        NewWatchRecord::new(channel, format!("http://example.invalid/{channel}.m3u8"), duration)
    }

    #[tokio::test]
    async fn test_append_stamps_item() {
        let (store, clock) = store();
        let buffer = HistoryBuffer::empty(store, HistoryConfig::default());
        buffer.set_user(Some("user-42".to_string()));

        let item = buffer.append(record("CCTV-1", 120)).await.unwrap();

        assert_eq!(item.watch_end, Some(clock.now()));
        assert_eq!(item.watch_start, clock.now() - ChronoDuration::seconds(120));
        assert_eq!(item.user_id.as_deref(), Some("user-42"));
        assert!(buffer.has_pending_changes());
        assert_eq!(buffer.statistics().total_watch_time, 120);
    }

    #[tokio::test]
    async fn test_newest_first() {
        let (store, clock) = store();
        let buffer = HistoryBuffer::empty(store, HistoryConfig::default());

        buffer.append(record("A", 20)).await.unwrap();
        clock.advance_secs(30);
        buffer.append(record("B", 20)).await.unwrap();

        let names: Vec<String> = buffer.items().into_iter().map(|i| i.channel_name).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_batch_ack_keeps_later_items_pending() {
        let (store, _) = store();
        let buffer = HistoryBuffer::empty(store, HistoryConfig::default());
        buffer.append(record("A", 20)).await.unwrap();
        buffer.append(record("B", 20)).await.unwrap();

        let batch = buffer.pending_batch().unwrap();
        assert_eq!(batch.items[0].channel_name, "A");

        // Appended while the upload is in flight
        buffer.append(record("C", 20)).await.unwrap();
        buffer.mark_batch_synced(&batch).await.unwrap();

        assert_eq!(buffer.unsynced_count(), 1);
        let pending = buffer.pending_batch().unwrap();
        assert_eq!(pending.items[0].channel_name, "C");
        assert!(buffer.last_synced_at().is_some());
    }

    #[tokio::test]
    async fn test_ack_after_clear_is_ignored() {
        let (store, _) = store();
        let buffer = HistoryBuffer::empty(store, HistoryConfig::default());
        buffer.append(record("A", 20)).await.unwrap();
        let batch = buffer.pending_batch().unwrap();

        buffer.clear().await.unwrap();
        buffer.append(record("B", 20)).await.unwrap();
        buffer.mark_batch_synced(&batch).await.unwrap();

        assert_eq!(buffer.unsynced_count(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_restores_items_and_pending() {
        let (store, _) = store();
        let buffer = HistoryBuffer::empty(store.clone(), HistoryConfig::default());
        buffer.append(record("A", 20)).await.unwrap();
        buffer.mark_synced().await.unwrap();
        buffer.append(record("B", 40)).await.unwrap();

        let reloaded = HistoryBuffer::load(store, HistoryConfig::default()).await;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.unsynced_count(), 1);
        assert_eq!(reloaded.statistics().total_watch_time, 60);
    }

    #[tokio::test]
    async fn test_custom_key_outlives_default_ttl() {
        let (store, clock) = store();
        let config = HistoryConfig {
            key: AppCacheKey::custom("history_v2", CacheScope::User),
            ..Default::default()
        };
        let buffer = HistoryBuffer::empty(store.clone(), config.clone());
        buffer.append(record("A", 20)).await.unwrap();

        clock.advance_secs(24 * 3600);

        let reloaded = HistoryBuffer::load(store, config).await;
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.has_pending_changes());
    }

    #[tokio::test]
    async fn test_v1_history_is_migrated() {
        let (store, clock) = store();
        let legacy = serde_json::json!([
            {
                "id": "legacy-1",
                "channelName": "CCTV-1",
                "channelUrl": "",
                "duration": 120,
                "watchStart": "2026-10-01T10:00:00Z",
                "watchEnd": null,
                "userId": "user-42"
            }
        ]);
        let entry = CacheEntry::new(
            "watch_history",
            Payload::new("watch_history", 1, "json", serde_json::to_vec(&legacy).unwrap()),
            ExpirationStrategy::until_cleared(),
            CacheScope::User,
            clock.now(),
        );
        store.backend().set(entry).await.unwrap();

        let buffer = HistoryBuffer::load(store, HistoryConfig::default()).await;
        assert_eq!(buffer.len(), 1);
        assert!(buffer.has_pending_changes());
        assert_eq!(buffer.items()[0].user_id.as_deref(), Some("user-42"));
    }

    #[tokio::test]
    async fn test_corrupt_history_starts_empty() {
        let (store, clock) = store();
        let entry = CacheEntry::new(
            "watch_history",
            Payload::new("watch_history", 2, "json", b"{ not json".to_vec()),
            ExpirationStrategy::until_cleared(),
            CacheScope::User,
            clock.now(),
        );
        store.backend().set(entry).await.unwrap();

        let buffer = HistoryBuffer::load(store, HistoryConfig::default()).await;
        assert!(buffer.is_empty());
        assert!(!buffer.has_pending_changes());
    }

    /// Backend whose reads never complete
    #[derive(Clone)]
    struct StalledBackend(MemoryBackend);

    #[async_trait]
    impl CacheBackend for StalledBackend {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry<Payload>>> {
            std::future::pending().await
        }
        async fn set(&self, entry: CacheEntry<Payload>) -> Result<()> {
            self.0.set(entry).await
        }
        async fn delete(&self, key: &str) -> Result<bool> {
            self.0.delete(key).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.0.exists(key).await
        }
        async fn delete_many(&self, keys: &[&str]) -> Result<u64> {
            self.0.delete_many(keys).await
        }
        async fn keys(&self) -> Result<Vec<String>> {
            self.0.keys().await
        }
        async fn clear(&self) -> Result<()> {
            self.0.clear().await
        }
        async fn stats(&self) -> Result<CacheStats> {
            self.0.stats().await
        }
        async fn len(&self) -> Result<usize> {
            self.0.len().await
        }
    }

    #[async_trait]
    impl ScopedBackend for StalledBackend {
        async fn keys_in_scope(&self, scope: CacheScope) -> Result<Vec<String>> {
            self.0.keys_in_scope(scope).await
        }
        async fn delete_scope(&self, scope: CacheScope) -> Result<u64> {
            self.0.delete_scope(scope).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_load_times_out_empty() {
        let store = CacheStore::new(StalledBackend(MemoryBackend::with_defaults()));
        let config = HistoryConfig::default().load_timeout(Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        let buffer = HistoryBuffer::load(store, config).await;

        assert!(buffer.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));

        // Still usable
        buffer.append(record("CCTV-1", 30)).await.unwrap();
        assert_eq!(buffer.len(), 1);
    }
}
