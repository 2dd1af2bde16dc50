//! Exit-sync coordinator
//!
//! Every exit path (back button, destroy, tracker exit) funnels into
//! `perform_exit_sync`. Concurrent callers share one run, so a batch is
//! uploaded at most once per flush.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use tvsync_core::{CacheMetrics, JsonSerializer, NoopMetrics, ScopedBackend, Serializer};

use super::{HistoryUploader, SyncError};
use crate::coalescer::SingleFlight;
use crate::config::SyncConfig;
use crate::history::{HistoryBuffer, PendingBatch};
use crate::playback::{ExitTrigger, PlaybackTracker};

const EXIT_SYNC_KEY: &str = "exit_sync";

/// Snapshot of the sync bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub has_pending_changes: bool,
    pub unsynced_count: usize,
    pub sync_in_flight: bool,
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Items uploaded by the last successful sync
    pub last_synced_count: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct SyncStatus {
    last_sync_attempt: Option<DateTime<Utc>>,
    last_synced_count: usize,
    last_error: Option<String>,
}

/// Single-flight, budgeted upload of pending history
pub struct ExitSyncCoordinator<B, S = JsonSerializer, M = NoopMetrics>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    buffer: HistoryBuffer<B, S, M>,
    uploader: Arc<dyn HistoryUploader>,
    config: SyncConfig,
    flight: SingleFlight<usize>,
    trackers: Mutex<Vec<Weak<PlaybackTracker>>>,
    status: RwLock<SyncStatus>,
}

impl<B, S, M> ExitSyncCoordinator<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    pub fn new(
        buffer: HistoryBuffer<B, S, M>,
        uploader: Arc<dyn HistoryUploader>,
        config: SyncConfig,
    ) -> Self {
        Self {
            buffer,
            uploader,
            config,
            flight: SingleFlight::new(),
            trackers: Mutex::new(Vec::new()),
            status: RwLock::new(SyncStatus::default()),
        }
    }

    /// Register a tracker to be flushed before each sync
    ///
    /// Only a weak reference is kept; dropped trackers are forgotten.
    pub fn attach(&self, tracker: &Arc<PlaybackTracker>) {
        let mut trackers = self.trackers.lock();
        trackers.retain(|t| t.strong_count() > 0);
        trackers.push(Arc::downgrade(tracker));
    }

    pub fn buffer(&self) -> &HistoryBuffer<B, S, M> {
        &self.buffer
    }

    /// Flush trackers and upload pending history
    ///
    /// Returns the number of items uploaded. Never fails: on error or when
    /// the budget runs out the items stay pending for the next attempt.
    pub async fn perform_exit_sync(&self) -> usize {
        self.flight
            .run(EXIT_SYNC_KEY, || async {
                match tokio::time::timeout(self.config.budget, self.sync_once()).await {
                    Ok(count) => count,
                    Err(_) => {
                        warn!(
                            target: "tvsync",
                            budget_ms = self.config.budget.as_millis() as u64,
                            pending = self.buffer.unsynced_count(),
                            "Exit sync ran out of time, items stay pending"
                        );
                        self.status.write().last_error = Some(SyncError::Timeout.to_string());
                        0
                    }
                }
            })
            .await
    }

    /// Snapshot of the sync bookkeeping
    pub fn sync_state(&self) -> SyncState {
        let status = self.status.read();
        SyncState {
            has_pending_changes: self.buffer.has_pending_changes(),
            unsynced_count: self.buffer.unsynced_count(),
            sync_in_flight: self.flight.is_in_flight(EXIT_SYNC_KEY),
            last_sync_attempt: status.last_sync_attempt,
            last_synced_at: self.buffer.last_synced_at(),
            last_synced_count: status.last_synced_count,
            last_error: status.last_error.clone(),
        }
    }

    async fn sync_once(&self) -> usize {
        self.flush_trackers().await;

        let Some(batch) = self.buffer.pending_batch() else {
            debug!(target: "tvsync", "Nothing to sync");
            return 0;
        };

        self.status.write().last_sync_attempt = Some(self.buffer.clock().now());
        match self.upload_with_retry(&batch).await {
            Ok(()) => {
                if let Err(e) = self.buffer.mark_batch_synced(&batch).await {
                    // Uploaded; the next start re-sends unless this persists later
                    warn!(target: "tvsync", error = %e, "Failed to persist sync acknowledgement");
                }
                {
                    let mut status = self.status.write();
                    status.last_synced_count = batch.len();
                    status.last_error = None;
                }
                info!(target: "tvsync", items = batch.len(), "History synced");
                batch.len()
            }
            Err(e) => {
                warn!(
                    target: "tvsync",
                    error = %e,
                    pending = batch.len(),
                    "History sync failed, items stay pending"
                );
                self.status.write().last_error = Some(e.to_string());
                0
            }
        }
    }

    async fn upload_with_retry(&self, batch: &PendingBatch) -> Result<(), SyncError> {
        let mut attempt = 1;
        loop {
            match self.uploader.upload(&batch.items).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.retry_delay(attempt);
                    debug!(
                        target: "tvsync",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Exponential backoff with up to 10% added jitter
    fn retry_delay(&self, retry: u32) -> Duration {
        let base = self.config.backoff_for(retry);
        let spread = (base.as_millis() / 10) as u64;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=spread))
    }

    async fn flush_trackers(&self) {
        let trackers: Vec<Arc<PlaybackTracker>> = {
            let mut trackers = self.trackers.lock();
            trackers.retain(|t| t.strong_count() > 0);
            trackers.iter().filter_map(Weak::upgrade).collect()
        };

        for tracker in trackers {
            if tracker.is_tracking() {
                tracker.finalize().await;
            }
        }
    }
}

#[async_trait]
impl<B, S, M> ExitTrigger for ExitSyncCoordinator<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    async fn trigger_exit_sync(&self) -> usize {
        self.perform_exit_sync().await
    }
}
