//! Metrics trait for cache observability

use std::time::Duration;

use crate::CacheScope;

/// Cache operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Get,
    Save,
    Clear,
    Serialize,
    Deserialize,
    Invalidate,
}

impl CacheOperation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Get => "get",
            CacheOperation::Save => "save",
            CacheOperation::Clear => "clear",
            CacheOperation::Serialize => "serialize",
            CacheOperation::Deserialize => "deserialize",
            CacheOperation::Invalidate => "invalidate",
        }
    }
}

/// Reason an entry was removed by the store itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurgeReason {
    /// Payload could not be decoded, even leniently
    Corrupt,
    /// Entry has no `saved_at`
    MissingTimestamp,
    /// A tracked field disagreed with the authoritative value
    FieldsChanged,
    /// Removed by a scope-wide clear
    ScopeCleared,
}

impl PurgeReason {
    /// Get reason as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeReason::Corrupt => "corrupt",
            PurgeReason::MissingTimestamp => "missing_timestamp",
            PurgeReason::FieldsChanged => "fields_changed",
            PurgeReason::ScopeCleared => "scope_cleared",
        }
    }
}

/// Trait for cache metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait CacheMetrics: Send + Sync + 'static {
    /// Record a cache hit
    fn record_hit(&self, key: &str, scope: CacheScope);

    /// Record a cache miss
    fn record_miss(&self, key: &str);

    /// Record a stale hit (served stale while revalidating)
    fn record_stale_hit(&self, key: &str);

    /// Record a payload recovered through lenient re-coercion
    fn record_migration(&self, key: &str, from_version: u32);

    /// Record operation latency
    fn record_latency(&self, operation: CacheOperation, duration: Duration);

    /// Record an entry removed by the store
    fn record_purge(&self, key: &str, reason: PurgeReason);

    /// Record cache size
    fn record_size(&self, size: usize, memory_bytes: usize);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str, _scope: CacheScope) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_stale_hit(&self, _key: &str) {}

    #[inline]
    fn record_migration(&self, _key: &str, _from_version: u32) {}

    #[inline]
    fn record_latency(&self, _operation: CacheOperation, _duration: Duration) {}

    #[inline]
    fn record_purge(&self, _key: &str, _reason: PurgeReason) {}

    #[inline]
    fn record_size(&self, _size: usize, _memory_bytes: usize) {}
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use tvsync_core::MetricsCrateAdapter;
///
/// let metrics = MetricsCrateAdapter::new("tvsync_cache");
/// // Emits: tvsync_cache_hits_total, tvsync_cache_misses_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl CacheMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str, scope: CacheScope) {
        metrics::counter!(self.metric_name("hits_total"), "scope" => scope.as_str()).increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!(self.metric_name("misses_total")).increment(1);
    }

    fn record_stale_hit(&self, _key: &str) {
        metrics::counter!(self.metric_name("stale_hits_total")).increment(1);
    }

    fn record_migration(&self, _key: &str, _from_version: u32) {
        metrics::counter!(self.metric_name("migrations_total")).increment(1);
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("operation_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_purge(&self, _key: &str, reason: PurgeReason) {
        metrics::counter!(
            self.metric_name("purges_total"),
            "reason" => reason.as_str()
        )
        .increment(1);
    }

    fn record_size(&self, size: usize, memory_bytes: usize) {
        metrics::gauge!(self.metric_name("entries")).set(size as f64);
        metrics::gauge!(self.metric_name("memory_bytes")).set(memory_bytes as f64);
    }
}
