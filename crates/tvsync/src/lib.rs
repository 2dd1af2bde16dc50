//! tvsync: Cache-and-sync engine for IPTV clients
//!
//! # Features
//!
//! - **Typed TTL cache** with jittered expiry and per-user scoping
//! - **Field-level invalidation** for values that must never be served stale
//! - **Schema drift tolerance**: old payloads migrate, corrupt ones are purged
//! - **Watch history** with rolling statistics and range/sort/page queries
//! - **Playback tracking** that debounces channel flipping
//! - **Exactly-once exit sync** shared by every exit path
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tvsync::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let session = TvSession::open(
//!         MemoryBackend::with_defaults(),
//!         Arc::new(NoopUploader),
//!         EngineConfig::default(),
//!     )
//!     .await;
//!
//!     let tracker = session.new_tracker();
//!     tracker.start_tracking(Channel::new("CCTV-1", "http://example.com/cctv1.m3u8")).await;
//!     // ... the user watches, then leaves
//!     let uploaded = session.on_back_pressed().await;
//!     println!("uploaded {uploaded} items");
//!
//!     Ok(())
//! }
//! ```

mod coalescer;
pub mod config;
pub mod history;
pub mod keys;
pub mod playback;
mod session;
pub mod store;
pub mod sync;

// Re-export core
pub use tvsync_core::*;

// Re-export storage
pub use tvsync_storage::{MemoryBackend, MemoryConfig};
#[cfg(feature = "file")]
pub use tvsync_storage::{FileBackend, FileConfig};

pub use config::{EngineConfig, HistoryConfig, StoreConfig, SyncConfig, TrackerConfig};
pub use history::{HistoryBuffer, HistorySink, WatchHistoryItem, WatchStatistics};
pub use keys::AppCacheKey;
pub use playback::{Channel, PlaybackTracker, TrackingState};
pub use session::TvSession;
pub use store::{CacheStore, FieldCheck, Loader, ReadThroughCache};
pub use sync::{ExitSyncCoordinator, HistoryUploader, NoopUploader, SyncError, SyncState};

#[cfg(feature = "http")]
pub use config::HttpUploaderConfig;
#[cfg(feature = "http")]
pub use sync::{HttpUploader, StaticToken, TokenProvider};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AppCacheKey, CacheError, CacheKey, CacheResult, CacheScope, CacheStore, CacheValue,
        Channel, EngineConfig, ExpirationStrategy, HistorySink, HistoryUploader, JsonSerializer,
        MemoryBackend, MemoryConfig, NoopUploader, PlaybackTracker, Result, Serializer, SyncError,
        TvSession, WatchHistoryItem,
    };

    pub use crate::history::{NewWatchRecord, SortBy, TimeRange};

    #[cfg(feature = "file")]
    pub use crate::{FileBackend, FileConfig};

    #[cfg(feature = "http")]
    pub use crate::{HttpUploader, HttpUploaderConfig, StaticToken, TokenProvider};

    #[cfg(feature = "msgpack")]
    pub use crate::MsgPackSerializer;
}

#[cfg(test)]
mod tests;
