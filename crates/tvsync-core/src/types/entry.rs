//! Cache entry type

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::payload::Payload;
use super::snapshot::FieldSnapshot;
use super::strategy::{CacheScope, ExpirationStrategy};

/// A cached entry with full metadata
///
/// Backends store `CacheEntry<Payload>`; the store hands out decoded
/// `CacheEntry<T>` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Full key (namespace included)
    pub key: String,
    /// The cached value
    pub value: T,
    /// When the entry was saved; entries without it are never valid
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    /// Strategy the entry was saved under
    pub strategy: ExpirationStrategy,
    /// TTL resolved once at save time (jitter applied)
    #[serde(default)]
    pub effective_ttl: Option<Duration>,
    /// Global or per-user
    #[serde(default)]
    pub scope: CacheScope,
    /// Tracked fields for content-based invalidation
    #[serde(default)]
    pub snapshot: Option<FieldSnapshot>,
}

impl<T> CacheEntry<T> {
    /// Create a new entry saved at `saved_at`, resolving the strategy once
    pub fn new(
        key: impl Into<String>,
        value: T,
        strategy: ExpirationStrategy,
        scope: CacheScope,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            saved_at: Some(saved_at),
            effective_ttl: strategy.resolve(),
            strategy,
            scope,
            snapshot: None,
        }
    }

    /// Attach a field snapshot
    pub fn with_snapshot(mut self, snapshot: FieldSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// TTL in force for this entry
    ///
    /// Falls back to the nominal strategy TTL for entries written before
    /// the effective TTL was recorded.
    pub fn ttl(&self) -> Option<Duration> {
        if !self.strategy.expires() {
            return None;
        }
        self.effective_ttl.or_else(|| self.strategy.ttl())
    }

    /// Instant after which the entry is expired
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let saved_at = self.saved_at?;
        let ttl = ChronoDuration::from_std(self.ttl()?).unwrap_or(ChronoDuration::MAX);
        saved_at.checked_add_signed(ttl)
    }

    /// Check if entry has expired at `now`
    ///
    /// An entry without `saved_at` is always expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.saved_at.is_none() {
            return true;
        }
        match self.expires_at() {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Check if entry is usable as fresh at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now)
    }

    /// Remaining TTL at `now`
    pub fn ttl_remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at()
            .and_then(|expires_at| (expires_at - now).to_std().ok())
    }

    /// Age of the entry at `now`
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        self.saved_at
            .and_then(|saved_at| (now - saved_at).to_std().ok())
            .unwrap_or_default()
    }

    /// Replace the value, keeping every piece of metadata
    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            key: self.key,
            value: f(self.value),
            saved_at: self.saved_at,
            strategy: self.strategy,
            effective_ttl: self.effective_ttl,
            scope: self.scope,
            snapshot: self.snapshot,
        }
    }
}

impl CacheEntry<Payload> {
    /// Size of the stored value in bytes
    pub fn size(&self) -> usize {
        self.value.len() + self.key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(strategy: ExpirationStrategy, saved_at: DateTime<Utc>) -> CacheEntry<&'static str> {
        CacheEntry::new("key", "value", strategy, CacheScope::Global, saved_at)
    }

    #[test]
    fn test_ttl_boundaries() {
        let saved_at = Utc::now();
        let entry = entry_at(ExpirationStrategy::fixed_secs(60), saved_at);

        assert!(entry.is_valid_at(saved_at + ChronoDuration::seconds(59)));
        assert!(entry.is_valid_at(saved_at + ChronoDuration::seconds(60)));
        assert!(!entry.is_valid_at(saved_at + ChronoDuration::seconds(61)));
    }

    #[test]
    fn test_until_cleared_never_expires() {
        let saved_at = Utc::now();
        let entry = entry_at(ExpirationStrategy::until_cleared(), saved_at);

        assert!(entry.is_valid_at(saved_at + ChronoDuration::days(3650)));
        assert!(entry.expires_at().is_none());
    }

    #[test]
    fn test_missing_saved_at_is_invalid() {
        let mut entry = entry_at(ExpirationStrategy::until_cleared(), Utc::now());
        entry.saved_at = None;
        assert!(!entry.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_effective_ttl_is_fixed_at_save() {
        let saved_at = Utc::now();
        let entry = entry_at(
            ExpirationStrategy::jittered(Duration::from_secs(100), Duration::from_secs(10)),
            saved_at,
        );
        let first = entry.expires_at();

        for _ in 0..10 {
            assert_eq!(entry.expires_at(), first);
        }
    }

    #[test]
    fn test_remaining_and_age() {
        let saved_at = Utc::now();
        let entry = entry_at(ExpirationStrategy::fixed_secs(60), saved_at);
        let now = saved_at + ChronoDuration::seconds(20);

        assert_eq!(entry.age_at(now), Duration::from_secs(20));
        assert_eq!(entry.ttl_remaining_at(now), Some(Duration::from_secs(40)));
        assert_eq!(entry.ttl_remaining_at(saved_at + ChronoDuration::seconds(90)), None);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let saved_at = Utc::now();
        let entry = entry_at(ExpirationStrategy::fixed_secs(60), saved_at)
            .with_snapshot(FieldSnapshot::new().with("vip", true));
        let mapped = entry.map(str::len);

        assert_eq!(mapped.value, 5);
        assert_eq!(mapped.saved_at, Some(saved_at));
        assert!(mapped.snapshot.is_some());
    }
}
