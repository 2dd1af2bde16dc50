//! Watch-history records and their derived views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use tvsync_core::CacheValue;

/// One finished watch segment
///
/// Immutable once created; removed only by clearing history or logging out.
/// Older builds wrote camelCase field names, which are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchHistoryItem {
    pub id: String,
    #[serde(alias = "channelName")]
    pub channel_name: String,
    #[serde(alias = "channelUrl", default)]
    pub channel_url: String,
    /// Watched seconds
    #[serde(default)]
    pub duration: u64,
    #[serde(alias = "watchStart")]
    pub watch_start: DateTime<Utc>,
    #[serde(alias = "watchEnd", default)]
    pub watch_end: Option<DateTime<Utc>>,
    #[serde(alias = "userId", default)]
    pub user_id: Option<String>,
}

/// A segment reported by a tracker, before the buffer stamps it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWatchRecord {
    pub channel_name: String,
    pub channel_url: String,
    pub duration: u64,
}

impl NewWatchRecord {
    pub fn new(channel_name: impl Into<String>, channel_url: impl Into<String>, duration: u64) -> Self {
        Self {
            channel_name: channel_name.into(),
            channel_url: channel_url.into(),
            duration,
        }
    }
}

/// Per-channel aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStat {
    pub channel_name: String,
    pub watch_count: u64,
    /// Seconds
    pub total_duration: u64,
}

/// Statistics derived from a set of history items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStatistics {
    /// Seconds
    pub total_watch_time: u64,
    pub total_channels: usize,
    pub total_watches: usize,
    pub most_watched_channel: Option<String>,
    /// Seconds spent on `most_watched_channel`
    pub most_watched_time: u64,
    /// Ranked by total duration, longest first
    pub channel_stats: Vec<ChannelStat>,
}

/// Durable form of the history buffer
///
/// Items are newest first; the first `unsynced` of them have not been
/// uploaded yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedHistory {
    pub items: Vec<WatchHistoryItem>,
    #[serde(default)]
    pub unsynced: usize,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CacheValue for PersistedHistory {
    const TYPE_TAG: &'static str = "watch_history";
    const VERSION: u32 = 2;

    fn migrate(_type_tag: &str, version: u32, value: Value) -> Option<Self> {
        match value {
            // v1 stored the bare list and kept no sync bookkeeping
            Value::Array(_) => {
                let items: Vec<WatchHistoryItem> = serde_json::from_value(value).ok()?;
                let unsynced = items.len();
                Some(Self {
                    items,
                    unsynced,
                    last_synced_at: None,
                })
            }
            other if version >= 2 => serde_json::from_value(other).ok(),
            other => {
                let mut history: Self = serde_json::from_value(other).ok()?;
                history.unsynced = history.items.len();
                Some(history)
            }
        }
    }
}

/// Time window applied before sorting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeRange {
    Today,
    /// Since Monday 00:00
    ThisWeek,
    ThisMonth,
    ThisYear,
    #[default]
    All,
}

/// Order of a history page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortBy {
    /// Newest first
    #[default]
    StartTime,
    /// Channel name, A to Z
    ChannelName,
    /// Longest first
    Duration,
}

/// Error for unknown range or sort labels
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label: {label}")]
pub struct UnknownLabel {
    kind: &'static str,
    label: String,
}

impl FromStr for TimeRange {
    type Err = UnknownLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.trim() {
            "今天" | "today" => Ok(TimeRange::Today),
            "本周" | "week" | "this_week" => Ok(TimeRange::ThisWeek),
            "本月" | "month" | "this_month" => Ok(TimeRange::ThisMonth),
            "今年" | "year" | "this_year" => Ok(TimeRange::ThisYear),
            "全部" | "all" => Ok(TimeRange::All),
            other => Err(UnknownLabel {
                kind: "time range",
                label: other.to_string(),
            }),
        }
    }
}

impl FromStr for SortBy {
    type Err = UnknownLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.trim() {
            "时间" | "time" | "start_time" => Ok(SortBy::StartTime),
            "频道" | "channel" | "name" => Ok(SortBy::ChannelName),
            "时长" | "duration" => Ok(SortBy::Duration),
            other => Err(UnknownLabel {
                kind: "sort",
                label: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SortBy::StartTime => "时间",
            SortBy::ChannelName => "频道",
            SortBy::Duration => "时长",
        };
        f.write_str(label)
    }
}

/// Page position within a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-indexed
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// One page of history with statistics for the filtered set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub items: Vec<WatchHistoryItem>,
    pub statistics: WatchStatistics,
    pub pagination: Pagination,
}
