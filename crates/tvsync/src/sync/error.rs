//! Upload error types

use thiserror::Error;

/// Errors from uploading a history batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Connection refused, reset, DNS failure
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload timed out")]
    Timeout,

    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No credentials to authenticate the upload with
    #[error("No auth token available")]
    NoToken,
}

impl SyncError {
    /// Whether retrying the same upload may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout => true,
            SyncError::Status { status, .. } => *status >= 500 || *status == 429,
            SyncError::Serialization(_) | SyncError::NoToken => false,
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() || err.is_builder() {
            SyncError::Serialization(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::Network(err.to_string())
        }
    }
}
