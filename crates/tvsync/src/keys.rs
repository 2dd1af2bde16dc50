//! Application cache keys
//!
//! Each key class carries its scope, expiration strategy and refresh
//! policy, so call sites never pick them ad hoc.

use std::time::Duration;

use tvsync_core::{CacheKey, CacheScope, ExpirationStrategy, RefreshPolicy};

/// Enumerated keys of the application cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppCacheKey {
    /// Profile of the signed-in user, including VIP entitlement
    UserInfo,
    /// Channel list and stream URLs
    ChannelCatalog,
    /// Remote application configuration
    AppConfig,
    /// Service announcement shown on the home screen
    ServiceBanner,
    /// Bearer token of the current session
    SessionToken,
    /// Persisted watch-history buffer
    WatchHistory,
    /// Extension point for keys outside the built-in set
    Custom { name: String, scope: CacheScope },
}

impl AppCacheKey {
    /// Create a custom key
    pub fn custom(name: impl Into<String>, scope: CacheScope) -> Self {
        AppCacheKey::Custom {
            name: name.into(),
            scope,
        }
    }

    /// Storage name of the key
    pub fn name(&self) -> &str {
        match self {
            AppCacheKey::UserInfo => "user_info",
            AppCacheKey::ChannelCatalog => "channel_catalog",
            AppCacheKey::AppConfig => "app_config",
            AppCacheKey::ServiceBanner => "service_banner",
            AppCacheKey::SessionToken => "session_token",
            AppCacheKey::WatchHistory => "watch_history",
            AppCacheKey::Custom { name, .. } => name,
        }
    }
}

impl CacheKey for AppCacheKey {
    fn cache_key(&self) -> String {
        self.name().to_string()
    }

    fn scope(&self) -> CacheScope {
        match self {
            AppCacheKey::UserInfo | AppCacheKey::SessionToken | AppCacheKey::WatchHistory => {
                CacheScope::User
            }
            AppCacheKey::ChannelCatalog | AppCacheKey::AppConfig | AppCacheKey::ServiceBanner => {
                CacheScope::Global
            }
            AppCacheKey::Custom { scope, .. } => *scope,
        }
    }

    fn strategy(&self) -> Option<ExpirationStrategy> {
        match self {
            AppCacheKey::UserInfo => Some(ExpirationStrategy::jittered(
                Duration::from_secs(30 * 60),
                Duration::from_secs(2 * 60),
            )),
            AppCacheKey::ChannelCatalog => Some(ExpirationStrategy::jittered(
                Duration::from_secs(6 * 3600),
                Duration::from_secs(30 * 60),
            )),
            AppCacheKey::AppConfig => Some(ExpirationStrategy::jittered(
                Duration::from_secs(3600),
                Duration::from_secs(5 * 60),
            )),
            AppCacheKey::ServiceBanner => Some(ExpirationStrategy::fixed_secs(15 * 60)),
            AppCacheKey::SessionToken | AppCacheKey::WatchHistory => {
                Some(ExpirationStrategy::until_cleared())
            }
            AppCacheKey::Custom { .. } => None,
        }
    }

    fn refresh_policy(&self) -> RefreshPolicy {
        match self {
            // Entitlement and credentials are never served stale
            AppCacheKey::UserInfo | AppCacheKey::SessionToken | AppCacheKey::WatchHistory => {
                RefreshPolicy::BlockUntilFresh
            }
            AppCacheKey::ChannelCatalog | AppCacheKey::AppConfig | AppCacheKey::ServiceBanner => {
                RefreshPolicy::StaleWhileRevalidate
            }
            AppCacheKey::Custom { .. } => RefreshPolicy::BlockUntilFresh,
        }
    }
}
