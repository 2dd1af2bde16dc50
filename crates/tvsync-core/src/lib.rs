//! tvsync-core: Core traits and types for the tvsync cache-and-sync engine
//!
//! This crate provides the foundational types and traits shared by the
//! storage backends and the high-level store, history and sync components.

mod clock;
mod error;
mod traits;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use traits::*;
pub use types::*;
