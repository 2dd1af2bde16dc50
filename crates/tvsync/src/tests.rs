//! Integration tests for TvSession

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::{FieldCheck, FieldSnapshot, ManualClock, TrackedFields};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingUploader {
        calls: AtomicUsize,
        batches: Mutex<Vec<Vec<(String, u64)>>>,
        delay: Duration,
        fail: bool,
    }

    impl CountingUploader {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HistoryUploader for CountingUploader {
        async fn upload(&self, items: &[WatchHistoryItem]) -> std::result::Result<(), SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(SyncError::Network("connection reset".to_string()));
            }
            self.batches.lock().push(
                items
                    .iter()
                    .map(|i| (i.channel_name.clone(), i.duration))
                    .collect(),
            );
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Profile {
        nickname: String,
        vip: bool,
    }

    impl CacheValue for Profile {
        const TYPE_TAG: &'static str = "profile";
    }

    impl TrackedFields for Profile {
        fn snapshot(&self) -> FieldSnapshot {
            FieldSnapshot::new().with("vip", self.vip)
        }
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Catalog {
        channels: Vec<String>,
    }

    impl CacheValue for Catalog {
        const TYPE_TAG: &'static str = "catalog";
    }

    async fn session(
        backend: MemoryBackend,
        clock: &ManualClock,
        uploader: Arc<CountingUploader>,
    ) -> TvSession<MemoryBackend> {
        let store = CacheStore::new(backend).with_clock(clock.clone());
        TvSession::with_store(store, uploader, EngineConfig::default()).await
    }

    #[tokio::test]
    async fn test_watch_session_scenario() {
        let uploader = Arc::new(CountingUploader::default());
        let clock = ManualClock::starting_now();
        let session = session(MemoryBackend::with_defaults(), &clock, uploader.clone()).await;
        let tracker = session.new_tracker();

        tracker.start_tracking(Channel::new("CCTV-1", "http://tv.example/cctv1")).await;
        clock.advance_secs(120);
        tracker.start_tracking(Channel::new("HunanTV", "http://tv.example/hunan")).await;
        clock.advance_secs(300);
        tracker.start_tracking(Channel::new("CCTV-1", "http://tv.example/cctv1")).await;
        clock.advance_secs(60);
        tracker.stop_tracking().await;

        let stats = session.history().statistics();
        assert_eq!(stats.total_watch_time, 480);
        assert_eq!(stats.total_channels, 2);
        assert_eq!(stats.total_watches, 3);
        assert_eq!(stats.most_watched_channel.as_deref(), Some("HunanTV"));
        assert_eq!(stats.most_watched_time, 300);

        let page = session.query(TimeRange::All, "时间".parse().unwrap(), 1, 20);
        let listed: Vec<(&str, u64)> = page
            .items
            .iter()
            .map(|i| (i.channel_name.as_str(), i.duration))
            .collect();
        assert_eq!(listed, vec![("CCTV-1", 60), ("HunanTV", 300), ("CCTV-1", 120)]);
        assert_eq!(page.pagination.total_items, 3);

        assert_eq!(session.on_back_pressed().await, 3);
        assert_eq!(
            *uploader.batches.lock(),
            vec![vec![
                ("CCTV-1".to_string(), 120),
                ("HunanTV".to_string(), 300),
                ("CCTV-1".to_string(), 60),
            ]]
        );
        assert!(!session.sync_state().has_pending_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_exit_path_shares_one_upload() {
        let uploader = Arc::new(CountingUploader {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let clock = ManualClock::starting_now();
        let session = session(MemoryBackend::with_defaults(), &clock, uploader.clone()).await;
        let tracker = session.new_tracker();

        tracker.start_tracking(Channel::new("CCTV-5", "")).await;
        clock.advance_secs(3);

        let (back, destroy, exit) = tokio::join!(
            session.on_back_pressed(),
            session.on_destroy(),
            tracker.on_app_exit(),
        );

        assert_eq!((back, destroy, exit), (1, 1, 1));
        assert_eq!(uploader.calls(), 1);
        assert_eq!(*uploader.batches.lock(), vec![vec![("CCTV-5".to_string(), 3)]]);
    }

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let clock = ManualClock::starting_now();
        let store = CacheStore::new(MemoryBackend::with_defaults()).with_clock(clock.clone());
        let catalog = Catalog {
            channels: vec!["CCTV-1".to_string()],
        };
        store.save(AppCacheKey::ChannelCatalog, &catalog, None).await.unwrap();

        let first = store.get::<Catalog>(AppCacheKey::ChannelCatalog).await;
        let second = store.get::<Catalog>(AppCacheKey::ChannelCatalog).await;
        let (first, second) = (first.entry().unwrap(), second.entry().unwrap());

        assert_eq!(first.value, second.value);
        assert_eq!(first.saved_at, second.saved_at);
        assert_eq!(first.effective_ttl, second.effective_ttl);
    }

    #[tokio::test]
    async fn test_jitter_is_bounded_and_fixed_per_save() {
        let store = CacheStore::new(MemoryBackend::with_defaults());
        let catalog = Catalog { channels: vec![] };
        let (low, high) = (Duration::from_secs(330 * 60), Duration::from_secs(390 * 60));

        for _ in 0..50 {
            store.save(AppCacheKey::ChannelCatalog, &catalog, None).await.unwrap();
            let entry = store
                .get::<Catalog>(AppCacheKey::ChannelCatalog)
                .await
                .entry()
                .unwrap();
            let ttl = entry.effective_ttl.unwrap();
            assert!(ttl >= low && ttl <= high, "ttl out of window: {ttl:?}");

            let again = store
                .get::<Catalog>(AppCacheKey::ChannelCatalog)
                .await
                .entry()
                .unwrap();
            assert_eq!(again.effective_ttl, Some(ttl));
        }
    }

    #[tokio::test]
    async fn test_fixed_ttl_boundary() {
        let clock = ManualClock::starting_now();
        let store = CacheStore::new(MemoryBackend::with_defaults()).with_clock(clock.clone());
        let banner = || AppCacheKey::custom("banner", CacheScope::Global);
        let fifteen_minutes = ExpirationStrategy::fixed_secs(900);
        store
            .save(banner(), &"maintenance".to_string(), fifteen_minutes)
            .await
            .unwrap();

        clock.advance_secs(899);
        assert!(store.is_valid(banner()).await);
        clock.advance_secs(2);
        assert!(!store.is_valid(banner()).await);
    }

    #[tokio::test]
    async fn test_field_change_overrides_ttl() {
        let clock = ManualClock::starting_now();
        let store = CacheStore::new(MemoryBackend::with_defaults()).with_clock(clock.clone());
        let cached = Profile {
            nickname: "viewer".to_string(),
            vip: true,
        };
        store.save_tracked(AppCacheKey::UserInfo, &cached, None).await.unwrap();

        clock.advance_secs(10);
        assert!(store.is_valid(AppCacheKey::UserInfo).await);

        let downgraded = Profile { vip: false, ..cached };
        assert_eq!(
            store.check_fields(AppCacheKey::UserInfo, &downgraded).await,
            FieldCheck::Changed(vec!["vip".to_string()])
        );
        assert!(!store.is_valid(AppCacheKey::UserInfo).await);
    }

    #[tokio::test]
    async fn test_switching_user_drops_user_scope_only() {
        let uploader = Arc::new(CountingUploader::default());
        let clock = ManualClock::starting_now();
        let session = session(MemoryBackend::with_defaults(), &clock, uploader).await;
        let store = session.store();

        session.login("alice").await.unwrap();
        let profile = Profile {
            nickname: "alice".to_string(),
            vip: true,
        };
        store.save(AppCacheKey::UserInfo, &profile, None).await.unwrap();
        store
            .save(AppCacheKey::ChannelCatalog, &Catalog { channels: vec![] }, None)
            .await
            .unwrap();
        session
            .history()
            .append(NewWatchRecord::new("CCTV-1", "", 60))
            .await
            .unwrap();

        // Same user again keeps everything
        session.login("alice").await.unwrap();
        assert!(store.is_valid(AppCacheKey::UserInfo).await);

        session.login("bob").await.unwrap();
        assert!(!store.is_valid(AppCacheKey::UserInfo).await);
        assert!(store.is_valid(AppCacheKey::ChannelCatalog).await);
        assert!(session.history().is_empty());
        assert_eq!(session.user_id().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_switching_user_uploads_pending_history_once() {
        let uploader = Arc::new(CountingUploader::default());
        let clock = ManualClock::starting_now();
        let session = session(MemoryBackend::with_defaults(), &clock, uploader.clone()).await;

        session.login("alice").await.unwrap();
        session
            .history()
            .append(NewWatchRecord::new("CCTV-1", "", 600))
            .await
            .unwrap();

        session.login("bob").await.unwrap();
        assert_eq!(uploader.calls(), 1);
        assert_eq!(
            *uploader.batches.lock(),
            vec![vec![("CCTV-1".to_string(), 600)]]
        );
        assert!(session.history().is_empty());
        assert_eq!(session.user_id().as_deref(), Some("bob"));

        // Nothing left for the next exit
        session.on_back_pressed().await;
        assert_eq!(uploader.calls(), 1);
    }

    #[tokio::test]
    async fn test_logout_flushes_then_clears() {
        let uploader = Arc::new(CountingUploader::default());
        let clock = ManualClock::starting_now();
        let session = session(MemoryBackend::with_defaults(), &clock, uploader.clone()).await;

        session.login("alice").await.unwrap();
        let tracker = session.new_tracker();
        tracker.start_tracking(Channel::new("HunanTV", "")).await;
        clock.advance_secs(30);
        tracker.stop_tracking().await;

        let item = &session.history().items()[0];
        assert_eq!(item.user_id.as_deref(), Some("alice"));

        session.logout().await.unwrap();
        assert_eq!(uploader.calls(), 1);
        assert!(session.history().is_empty());
        assert_eq!(session.user_id(), None);
    }

    #[cfg(feature = "file")]
    #[tokio::test]
    async fn test_failed_upload_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tvsync.json");
        let clock = ManualClock::starting_now();

        {
            let uploader = Arc::new(CountingUploader {
                fail: true,
                ..Default::default()
            });
            let backend = FileBackend::open(FileConfig::new(&path)).await.unwrap();
            let store = CacheStore::new(backend).with_clock(clock.clone());
            let session = TvSession::with_store(
                store,
                uploader.clone(),
                EngineConfig {
                    sync: crate::SyncConfig::default()
                        .max_attempts(2)
                        .initial_backoff(Duration::from_millis(1)),
                    ..Default::default()
                },
            )
            .await;
            session.login("alice").await.unwrap();

            let tracker = session.new_tracker();
            tracker.start_tracking(Channel::new("CCTV-1", "")).await;
            clock.advance_secs(45);
            assert_eq!(tracker.on_app_exit().await, 0);
            assert_eq!(uploader.calls(), 2);
        }

        let uploader = Arc::new(CountingUploader::default());
        let session = TvSession::open_file(&path, uploader.clone(), EngineConfig::default())
            .await
            .unwrap();

        assert_eq!(session.user_id().as_deref(), Some("alice"));
        let state = session.sync_state();
        assert!(state.has_pending_changes);
        assert_eq!(state.unsynced_count, 1);

        assert_eq!(session.on_destroy().await, 1);
        assert_eq!(*uploader.batches.lock(), vec![vec![("CCTV-1".to_string(), 45)]]);
    }
}
