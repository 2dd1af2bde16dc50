use crate::{CacheMetrics, CacheOperation, CacheScope, PurgeReason};
use std::time::Duration;
use tracing::{debug, warn};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_hit(&self, key: &str, scope: CacheScope) {
        debug!(
            target: "tvsync",
            event = "hit",
            key = %key,
            scope = scope.as_str(),
            service = ?self.service_name,
            "Cache Hit"
        );
    }

    fn record_miss(&self, key: &str) {
        debug!(
            target: "tvsync",
            event = "miss",
            key = %key,
            service = ?self.service_name,
            "Cache Miss"
        );
    }

    fn record_stale_hit(&self, key: &str) {
        debug!(
            target: "tvsync",
            event = "stale_hit",
            key = %key,
            service = ?self.service_name,
            "Cache Stale Hit"
        );
    }

    fn record_migration(&self, key: &str, from_version: u32) {
        debug!(
            target: "tvsync",
            event = "migration",
            key = %key,
            from_version,
            service = ?self.service_name,
            "Cache Payload Migrated"
        );
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        tracing::trace!(
            target: "tvsync",
            event = "latency",
            operation = operation.as_str(),
            duration_ms = duration.as_millis(),
            service = ?self.service_name,
            "Cache Operation Latency"
        );
    }

    fn record_purge(&self, key: &str, reason: PurgeReason) {
        warn!(
            target: "tvsync",
            event = "purge",
            key = %key,
            reason = reason.as_str(),
            service = ?self.service_name,
            "Cache Entry Purged"
        );
    }

    fn record_size(&self, size: usize, memory_bytes: usize) {
        tracing::trace!(
            target: "tvsync",
            event = "size",
            size = size,
            bytes = memory_bytes,
            service = ?self.service_name,
            "Cache Size Update"
        );
    }
}
