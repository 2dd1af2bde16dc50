//! Exactly-once upload of watch history on exit

mod coordinator;
mod error;
#[cfg(feature = "http")]
mod http;
mod uploader;

pub use coordinator::{ExitSyncCoordinator, SyncState};
pub use error::SyncError;
#[cfg(feature = "http")]
pub use http::{HttpUploader, StaticToken, TokenProvider};
pub use uploader::{HistoryUploader, NoopUploader};
