//! Engine configuration

use std::time::Duration;

use tvsync_core::ExpirationStrategy;

use crate::keys::AppCacheKey;

/// Configuration for `CacheStore`
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Strategy for saves whose key names none and that pass none
    pub default_strategy: ExpirationStrategy,
    /// Namespace prefix for all keys
    pub namespace: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_strategy: ExpirationStrategy::jittered(
                Duration::from_secs(300),
                Duration::from_secs(30),
            ),
            namespace: None,
        }
    }
}

impl StoreConfig {
    /// Create config with a specific default strategy
    pub fn with_strategy(strategy: ExpirationStrategy) -> Self {
        Self {
            default_strategy: strategy,
            ..Default::default()
        }
    }

    /// Create config with namespace
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Drop jitter from the default strategy
    pub fn no_jitter(mut self) -> Self {
        if let Some(ttl) = self.default_strategy.ttl() {
            self.default_strategy = ExpirationStrategy::fixed(ttl);
        }
        self
    }
}

/// Configuration for `HistoryBuffer`
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Upper bound for reading the persisted list at startup
    pub load_timeout: Duration,
    /// Key the list is persisted under
    pub key: AppCacheKey,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(3),
            key: AppCacheKey::WatchHistory,
        }
    }
}

impl HistoryConfig {
    /// Set the startup load timeout
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }
}

/// Configuration for `PlaybackTracker`
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Shortest segment worth a history record
    pub min_record_duration: Duration,
    /// Shortest gap between two switch-emitted records
    pub min_switch_interval: Duration,
    /// Progress ticker period
    pub tick_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_record_duration: Duration::from_secs(15),
            min_switch_interval: Duration::from_secs(5),
            tick_interval: Duration::from_secs(60),
        }
    }
}

impl TrackerConfig {
    /// Set the minimum record duration
    pub fn min_record_duration(mut self, duration: Duration) -> Self {
        self.min_record_duration = duration;
        self
    }

    /// Set the minimum switch interval
    pub fn min_switch_interval(mut self, interval: Duration) -> Self {
        self.min_switch_interval = interval;
        self
    }

    /// Set the ticker period
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Configuration for `ExitSyncCoordinator`
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upload attempts per sync, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per retry
    pub initial_backoff: Duration,
    /// Ceiling for the retry delay
    pub max_backoff: Duration,
    /// Wall-clock budget for one whole sync
    pub budget: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
            budget: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Set the attempt limit
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the first retry delay
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the overall budget
    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Configuration for the HTTP uploader
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpUploaderConfig {
    /// Full URL history batches are posted to
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

#[cfg(feature = "http")]
impl HttpUploaderConfig {
    /// Create config for an endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Set the per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Aggregate configuration for `TvSession`
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub history: HistoryConfig,
    pub tracker: TrackerConfig,
    pub sync: SyncConfig,
}
