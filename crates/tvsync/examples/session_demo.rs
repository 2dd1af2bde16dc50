//! Walk through a viewing session: cache, track, query, sync

use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tvsync::prelude::*;
use tvsync::{StoreConfig, TracingMetrics, TrackerConfig};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Lineup {
    channels: Vec<String>,
}

impl CacheValue for Lineup {
    const TYPE_TAG: &'static str = "lineup";
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = std::env::temp_dir().join("tvsync-demo.json");
    let backend = FileBackend::open(FileConfig::new(&path)).await?;
    let store = CacheStore::with_serializer_and_metrics(
        backend,
        JsonSerializer,
        TracingMetrics::new().with_service_name("session-demo"),
        StoreConfig::default(),
    );

    // Short thresholds so the demo finishes in seconds
    let config = EngineConfig {
        tracker: TrackerConfig::default()
            .min_record_duration(Duration::from_secs(1))
            .min_switch_interval(Duration::from_secs(1)),
        ..Default::default()
    };
    let session = TvSession::with_store(store, Arc::new(NoopUploader), config).await;
    session.login("demo-user").await?;

    let lineup = Lineup {
        channels: vec!["CCTV-1".to_string(), "HunanTV".to_string()],
    };
    session
        .store()
        .save(AppCacheKey::ChannelCatalog, &lineup, None)
        .await?;
    if let Some(cached) = session
        .store()
        .get::<Lineup>(AppCacheKey::ChannelCatalog)
        .await
        .value()
    {
        println!("Lineup: {:?}", cached.channels);
    }

    let tracker = session.new_tracker();
    for name in &lineup.channels {
        tracker
            .start_tracking(Channel::new(name.as_str(), format!("http://tv.example/{name}.m3u8")))
            .await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    tracker.stop_tracking().await;

    let page = session.query(TimeRange::Today, SortBy::Duration, 1, 10);
    for item in &page.items {
        println!("{:>10}  {}s", item.channel_name, item.duration);
    }
    println!(
        "Total {}s over {} channels",
        page.statistics.total_watch_time, page.statistics.total_channels
    );

    let uploaded = session.on_back_pressed().await;
    println!("Uploaded {uploaded} items, state: {:?}", session.sync_state());
    println!("Store persisted at {}", path.display());

    Ok(())
}
