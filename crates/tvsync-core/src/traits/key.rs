//! Cache key trait and implementations

use crate::{CacheScope, ExpirationStrategy, RefreshPolicy};

/// Trait for types that can be used as cache keys
///
/// Besides the key string, a key class decides where its entries live
/// (`scope`), how long they last by default (`strategy`) and what a read
/// does once they expire (`refresh_policy`).
pub trait CacheKey: Send + Sync {
    /// Generate the key string
    fn cache_key(&self) -> String;

    /// Optional namespace for the key
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// Get the full key including namespace
    fn full_key(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}:{}", ns, self.cache_key()),
            None => self.cache_key(),
        }
    }

    /// Scope entries of this key are saved under
    fn scope(&self) -> CacheScope {
        CacheScope::Global
    }

    /// Default expiration strategy; `None` defers to the store config
    fn strategy(&self) -> Option<ExpirationStrategy> {
        None
    }

    /// Behaviour once an entry has expired
    fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::BlockUntilFresh
    }
}

// Implementations for common types

impl CacheKey for String {
    fn cache_key(&self) -> String {
        self.clone()
    }
}

impl CacheKey for &str {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheKey for &String {
    fn cache_key(&self) -> String {
        (*self).clone()
    }
}
