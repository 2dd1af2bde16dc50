//! Expiration strategy, scope and refresh policy

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a saved entry stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpirationStrategy {
    /// Fixed time-to-live
    Fixed { ttl: Duration },
    /// TTL shifted by a uniform random offset in `[-jitter, +jitter]`
    ///
    /// Spreads refreshes of the same key across many devices.
    Jittered { ttl: Duration, jitter: Duration },
    /// Never expires; removed only by an explicit clear (session tokens)
    UntilCleared,
}

impl ExpirationStrategy {
    /// Fixed TTL
    pub fn fixed(ttl: Duration) -> Self {
        ExpirationStrategy::Fixed { ttl }
    }

    /// Fixed TTL in seconds
    pub fn fixed_secs(seconds: u64) -> Self {
        Self::fixed(Duration::from_secs(seconds))
    }

    /// TTL with a jitter window
    pub fn jittered(ttl: Duration, jitter: Duration) -> Self {
        if jitter.is_zero() {
            return Self::fixed(ttl);
        }
        ExpirationStrategy::Jittered { ttl, jitter }
    }

    /// Keep until explicitly cleared
    pub fn until_cleared() -> Self {
        ExpirationStrategy::UntilCleared
    }

    /// Nominal TTL, before jitter
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            ExpirationStrategy::Fixed { ttl } | ExpirationStrategy::Jittered { ttl, .. } => {
                Some(*ttl)
            }
            ExpirationStrategy::UntilCleared => None,
        }
    }

    /// Check if entries saved under this strategy can ever expire
    pub fn expires(&self) -> bool {
        !matches!(self, ExpirationStrategy::UntilCleared)
    }

    /// Resolve the effective TTL for one save
    ///
    /// Called exactly once per save; the result is stored with the entry.
    pub fn resolve(&self) -> Option<Duration> {
        self.resolve_with(&mut rand::rng())
    }

    /// Resolve the effective TTL with a caller-supplied RNG
    pub fn resolve_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Duration> {
        match *self {
            ExpirationStrategy::Fixed { ttl } => Some(ttl),
            ExpirationStrategy::Jittered { ttl, jitter } => {
                let window = jitter.as_millis().min(i64::MAX as u128) as i64;
                if window == 0 {
                    return Some(ttl);
                }
                let base = ttl.as_millis().min(i64::MAX as u128) as i64;
                let offset = rng.random_range(-window..=window);
                Some(Duration::from_millis(base.saturating_add(offset).max(0) as u64))
            }
            ExpirationStrategy::UntilCleared => None,
        }
    }
}

/// Visibility of a cache entry across logins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Shared by every user of the device (app config, banners)
    #[default]
    Global,
    /// Belongs to the signed-in user; dropped on logout/login
    User,
}

impl CacheScope {
    /// Get scope as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheScope::Global => "global",
            CacheScope::User => "user",
        }
    }
}

/// What a read does with an entry whose TTL has run out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RefreshPolicy {
    /// Expired entries read as misses; loaders are awaited
    #[default]
    BlockUntilFresh,
    /// Expired entries are served as stale while one refresh runs
    StaleWhileRevalidate,
}
