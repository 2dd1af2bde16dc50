//! Upload seam between the coordinator and the server

use async_trait::async_trait;
use std::sync::Arc;

use super::SyncError;
use crate::history::WatchHistoryItem;

/// Sends a batch of history items to the server
///
/// Items arrive oldest first. An `Ok` means the server has all of them.
#[async_trait]
pub trait HistoryUploader: Send + Sync + 'static {
    async fn upload(&self, items: &[WatchHistoryItem]) -> Result<(), SyncError>;
}

#[async_trait]
impl<U: HistoryUploader> HistoryUploader for Arc<U> {
    async fn upload(&self, items: &[WatchHistoryItem]) -> Result<(), SyncError> {
        (**self).upload(items).await
    }
}

/// Uploader that accepts and drops everything
///
/// For offline builds and sessions without an account.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUploader;

#[async_trait]
impl HistoryUploader for NoopUploader {
    async fn upload(&self, _items: &[WatchHistoryItem]) -> Result<(), SyncError> {
        Ok(())
    }
}
