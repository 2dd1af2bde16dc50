//! HTTP uploader

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::{HistoryUploader, SyncError};
use crate::config::HttpUploaderConfig;
use crate::history::WatchHistoryItem;

/// Source of the bearer token for uploads
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    /// Current token, `None` when signed out
    async fn token(&self) -> Option<String>;
}

/// A fixed token
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    items: &'a [WatchHistoryItem],
}

/// Posts batches as JSON with a bearer token
#[derive(Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpUploader {
    pub fn new(config: HttpUploaderConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl HistoryUploader for HttpUploader {
    async fn upload(&self, items: &[WatchHistoryItem]) -> Result<(), SyncError> {
        let token = self.tokens.token().await.ok_or(SyncError::NoToken)?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&UploadRequest { items })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(target: "tvsync", items = items.len(), status = status.as_u16(), "Batch uploaded");
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(SyncError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct SignedOut;

    #[async_trait]
    impl TokenProvider for SignedOut {
        async fn token(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn test_signed_out_does_not_upload() {
        let uploader = HttpUploader::new(
            HttpUploaderConfig::new("http://127.0.0.1:9/history"),
            Arc::new(SignedOut),
        )
        .unwrap();

        assert_eq!(uploader.upload(&[]).await, Err(SyncError::NoToken));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let uploader = HttpUploader::new(
            HttpUploaderConfig::new("http://127.0.0.1:9/history")
                .request_timeout(Duration::from_secs(2)),
            Arc::new(StaticToken::new("secret")),
        )
        .unwrap();

        let err = uploader.upload(&[]).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
