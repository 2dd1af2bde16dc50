//! Field-level invalidation
//!
//! Some cached facts (VIP flag, plan end date) must not be served once the
//! authoritative source disagrees, however young the entry. Entries saved
//! with `save_tracked` carry a `FieldSnapshot`; checking them against a
//! freshly fetched value invalidates on any tracked difference.

use tracing::info;

use tvsync_core::{
    CacheKey, CacheMetrics, CacheValue, ExpirationStrategy, PurgeReason, Result, ScopedBackend,
    Serializer, TrackedFields,
};

use super::CacheStore;

/// Outcome of a field check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldCheck {
    /// Unexpired and every tracked field agrees
    Valid,
    /// Nothing stored under the key
    Missing,
    /// TTL has run out
    Expired,
    /// Stored without a snapshot, so it cannot be vouched for
    Untracked,
    /// These tracked fields differ; the entry has been purged
    Changed(Vec<String>),
}

impl FieldCheck {
    /// Check if the entry may be served
    pub fn is_valid(&self) -> bool {
        matches!(self, FieldCheck::Valid)
    }
}

impl<B, S, M> CacheStore<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    /// Save a value together with its tracked-field snapshot
    pub async fn save_tracked<K, T>(
        &self,
        key: K,
        value: &T,
        strategy: impl Into<Option<ExpirationStrategy>>,
    ) -> Result<()>
    where
        K: CacheKey,
        T: CacheValue + TrackedFields,
    {
        let key = self.resolve(&key);
        let payload = self.encode(value)?;
        self.put(&key, payload, strategy.into(), Some(value.snapshot()))
            .await?;
        Ok(())
    }

    /// Compare a freshly fetched value with the stored snapshot
    pub async fn check_fields<T>(&self, key: impl CacheKey, current: &T) -> FieldCheck
    where
        T: TrackedFields + ?Sized,
    {
        let key = self.resolve(&key);
        let Some(entry) = self.fetch(&key).await else {
            return FieldCheck::Missing;
        };

        let Some(stored) = entry.snapshot.as_ref() else {
            return FieldCheck::Untracked;
        };

        let changed = stored.changed_fields(&current.snapshot());
        if !changed.is_empty() {
            info!(
                target: "tvsync",
                key = %key.full,
                fields = ?changed,
                "Tracked fields changed, invalidating entry"
            );
            self.purge(&key.full, PurgeReason::FieldsChanged).await;
            return FieldCheck::Changed(changed);
        }

        if entry.is_expired_at(self.clock.now()) {
            return FieldCheck::Expired;
        }
        FieldCheck::Valid
    }

    /// Check TTL and tracked fields together
    pub async fn is_valid_with_field_check<T>(&self, key: impl CacheKey, current: &T) -> bool
    where
        T: TrackedFields + ?Sized,
    {
        self.check_fields(key, current).await.is_valid()
    }
}
