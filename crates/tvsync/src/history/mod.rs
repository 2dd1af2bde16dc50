//! Watch-history buffer and aggregator

use async_trait::async_trait;

use tvsync_core::{CacheMetrics, Result, ScopedBackend, Serializer};

mod buffer;
mod model;
pub mod query;
pub mod stats;

pub use buffer::{HistoryBuffer, PendingBatch};
pub use model::{
    ChannelStat, HistoryPage, NewWatchRecord, Pagination, PersistedHistory, SortBy, TimeRange,
    UnknownLabel, WatchHistoryItem, WatchStatistics,
};

/// Destination for finished watch segments
#[async_trait]
pub trait HistorySink: Send + Sync + 'static {
    /// Store a segment and return the stamped item
    async fn record(&self, record: NewWatchRecord) -> Result<WatchHistoryItem>;
}

#[async_trait]
impl<B, S, M> HistorySink for HistoryBuffer<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    async fn record(&self, record: NewWatchRecord) -> Result<WatchHistoryItem> {
        self.append(record).await
    }
}
