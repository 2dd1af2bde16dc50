//! Statistics fold over history items

use std::collections::HashMap;

use super::model::{ChannelStat, WatchHistoryItem, WatchStatistics};

/// Compute statistics from scratch
///
/// Always a full pass over `items`; never patched incrementally.
pub fn compute(items: &[WatchHistoryItem]) -> WatchStatistics {
    let mut per_channel: HashMap<&str, (u64, u64)> = HashMap::new();
    let mut total_watch_time = 0u64;

    for item in items {
        total_watch_time = total_watch_time.saturating_add(item.duration);
        let (count, duration) = per_channel.entry(item.channel_name.as_str()).or_default();
        *count += 1;
        *duration = duration.saturating_add(item.duration);
    }

    let mut channel_stats: Vec<ChannelStat> = per_channel
        .into_iter()
        .map(|(name, (watch_count, total_duration))| ChannelStat {
            channel_name: name.to_string(),
            watch_count,
            total_duration,
        })
        .collect();
    // Ties broken by name so the ranking is stable
    channel_stats.sort_by(|a, b| {
        b.total_duration
            .cmp(&a.total_duration)
            .then_with(|| a.channel_name.cmp(&b.channel_name))
    });

    let (most_watched_channel, most_watched_time) = match channel_stats.first() {
        Some(top) => (Some(top.channel_name.clone()), top.total_duration),
        None => (None, 0),
    };

    WatchStatistics {
        total_watch_time,
        total_channels: channel_stats.len(),
        total_watches: items.len(),
        most_watched_channel,
        most_watched_time,
        channel_stats,
    }
}
