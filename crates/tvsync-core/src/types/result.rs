//! Cache result type

use super::entry::CacheEntry;

/// Result of a cache lookup operation
#[derive(Debug, Clone)]
pub enum CacheResult<T> {
    /// Fresh cache hit
    Hit(CacheEntry<T>),
    /// Expired but served under a stale-while-revalidate policy
    Stale(CacheEntry<T>),
    /// Cache miss (absent, expired under a blocking policy, or purged)
    Miss,
}

impl<T> CacheResult<T> {
    /// Check if this is a fresh hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }

    /// Check if this is a miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheResult::Miss)
    }

    /// Check if a value was found (hit or stale)
    pub fn found(&self) -> bool {
        matches!(self, CacheResult::Hit(_) | CacheResult::Stale(_))
    }

    /// Check if stale (needs revalidation)
    pub fn is_stale(&self) -> bool {
        matches!(self, CacheResult::Stale(_))
    }

    /// Extract the value, consuming the result
    pub fn value(self) -> Option<T> {
        self.entry().map(|entry| entry.value)
    }

    /// Extract the full entry, consuming the result
    pub fn entry(self) -> Option<CacheEntry<T>> {
        match self {
            CacheResult::Hit(entry) | CacheResult::Stale(entry) => Some(entry),
            CacheResult::Miss => None,
        }
    }

    /// Map the value if present
    pub fn map<U, F>(self, f: F) -> CacheResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CacheResult::Hit(entry) => CacheResult::Hit(entry.map(f)),
            CacheResult::Stale(entry) => CacheResult::Stale(entry.map(f)),
            CacheResult::Miss => CacheResult::Miss,
        }
    }
}
