//! Top-level session owning the store, history and sync

use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "file")]
use std::path::PathBuf;
#[cfg(feature = "file")]
use tvsync_storage::{FileBackend, FileConfig};

use tvsync_core::{
    CacheMetrics, CacheResult, CacheScope, ExpirationStrategy, JsonSerializer, NoopMetrics,
    Result, ScopedBackend, Serializer,
};

use crate::config::EngineConfig;
use crate::history::{HistoryBuffer, HistoryPage, SortBy, TimeRange};
use crate::keys::AppCacheKey;
use crate::playback::PlaybackTracker;
use crate::store::CacheStore;
use crate::sync::{ExitSyncCoordinator, HistoryUploader, SyncState};

fn session_user_key() -> AppCacheKey {
    AppCacheKey::custom("session_user", CacheScope::Global)
}

/// Owns the engine for one app process
///
/// Trackers are handed out per video surface and attached to the exit
/// coordinator, so any exit path flushes them before uploading.
pub struct TvSession<B, S = JsonSerializer, M = NoopMetrics>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    store: CacheStore<B, S, M>,
    history: HistoryBuffer<B, S, M>,
    coordinator: Arc<ExitSyncCoordinator<B, S, M>>,
    config: EngineConfig,
}

impl<B: ScopedBackend> TvSession<B> {
    /// Open a session over `backend` with JSON payloads
    pub async fn open(backend: B, uploader: Arc<dyn HistoryUploader>, config: EngineConfig) -> Self {
        let store = CacheStore::with_config(backend, config.store.clone());
        Self::with_store(store, uploader, config).await
    }
}

#[cfg(feature = "file")]
impl TvSession<FileBackend> {
    /// Open a session persisted in a file
    pub async fn open_file(
        path: impl Into<PathBuf>,
        uploader: Arc<dyn HistoryUploader>,
        config: EngineConfig,
    ) -> Result<Self> {
        let backend = FileBackend::open(FileConfig::new(path)).await?;
        Ok(Self::open(backend, uploader, config).await)
    }
}

impl<B, S, M> TvSession<B, S, M>
where
    B: ScopedBackend,
    S: Serializer,
    M: CacheMetrics,
{
    /// Open a session over a configured store
    ///
    /// Loads persisted history (bounded by the history load timeout) and
    /// restores the signed-in user.
    pub async fn with_store(
        store: CacheStore<B, S, M>,
        uploader: Arc<dyn HistoryUploader>,
        config: EngineConfig,
    ) -> Self {
        let history = HistoryBuffer::load(store.clone(), config.history.clone()).await;
        if let CacheResult::Hit(entry) = store.get::<String>(session_user_key()).await {
            history.set_user(Some(entry.value));
        }

        let coordinator = Arc::new(ExitSyncCoordinator::new(
            history.clone(),
            uploader,
            config.sync.clone(),
        ));

        Self {
            store,
            history,
            coordinator,
            config,
        }
    }

    pub fn store(&self) -> &CacheStore<B, S, M> {
        &self.store
    }

    pub fn history(&self) -> &HistoryBuffer<B, S, M> {
        &self.history
    }

    pub fn coordinator(&self) -> &Arc<ExitSyncCoordinator<B, S, M>> {
        &self.coordinator
    }

    /// Tracker for a new video surface
    pub fn new_tracker(&self) -> Arc<PlaybackTracker> {
        let tracker = Arc::new(
            PlaybackTracker::new(
                Arc::new(self.history.clone()),
                self.store.clock(),
                self.config.tracker.clone(),
            )
            .with_exit_trigger(self.coordinator.clone()),
        );
        self.coordinator.attach(&tracker);
        tracker
    }

    /// Filtered, sorted, paginated history
    pub fn query(&self, range: TimeRange, sort: SortBy, page: usize, page_size: usize) -> HistoryPage {
        self.history.query(range, sort, page, page_size)
    }

    pub fn sync_state(&self) -> SyncState {
        self.coordinator.sync_state()
    }

    /// Back navigation out of the app
    pub async fn on_back_pressed(&self) -> usize {
        info!(target: "tvsync", "Back pressed, syncing history");
        self.coordinator.perform_exit_sync().await
    }

    /// Process teardown
    pub async fn on_destroy(&self) -> usize {
        info!(target: "tvsync", "Destroying session, syncing history");
        self.coordinator.perform_exit_sync().await
    }

    /// The signed-in user, if any
    pub fn user_id(&self) -> Option<String> {
        self.history.user_id()
    }

    /// Sign a user in
    ///
    /// A different user than the one signed in before gets the previous
    /// user's history flushed, then every user-scoped entry dropped. An
    /// anonymous session keeps its data.
    pub async fn login(&self, user_id: impl Into<String>) -> Result<()> {
        let user_id = user_id.into();
        match self.history.user_id() {
            Some(current) if current == user_id => return Ok(()),
            Some(previous) => {
                self.coordinator.perform_exit_sync().await;
                let unsynced = self.history.unsynced_count();
                if unsynced > 0 {
                    warn!(
                        target: "tvsync",
                        previous = %previous,
                        unsynced,
                        "Switching user with history that never reached the server"
                    );
                }

                let cleared = self.store.clear_user_scoped().await?;
                self.history.clear().await?;
                info!(target: "tvsync", previous = %previous, cleared, "User changed, dropped user data");
            }
            None => {}
        }

        self.store
            .save(session_user_key(), &user_id, ExpirationStrategy::UntilCleared)
            .await?;
        self.history.set_user(Some(user_id.clone()));
        info!(target: "tvsync", user = %user_id, "User signed in");
        Ok(())
    }

    /// Sign the user out
    ///
    /// Flushes history, then drops user-scoped cache and history. Items
    /// that could not be uploaded are lost.
    pub async fn logout(&self) -> Result<()> {
        self.coordinator.perform_exit_sync().await;

        let unsynced = self.history.unsynced_count();
        if unsynced > 0 {
            warn!(target: "tvsync", unsynced, "Signing out with history that never reached the server");
        }

        let cleared = self.store.clear_user_scoped().await?;
        self.history.clear().await?;
        self.store.clear(session_user_key()).await?;
        self.history.set_user(None);
        info!(target: "tvsync", cleared, "User signed out");
        Ok(())
    }
}
