//! Core types for cache operations

mod entry;
mod payload;
mod result;
mod snapshot;
mod stats;
mod strategy;

pub use entry::CacheEntry;
pub use payload::Payload;
pub use result::CacheResult;
pub use snapshot::FieldSnapshot;
pub use stats::CacheStats;
pub use strategy::{CacheScope, ExpirationStrategy, RefreshPolicy};
