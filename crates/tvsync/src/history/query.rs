//! Filter, sort and paginate history items

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::model::{HistoryPage, Pagination, SortBy, TimeRange, WatchHistoryItem};
use super::stats;

/// Start of the window for `range`, on the wall-clock of `now`'s zone
///
/// `None` means unbounded.
pub fn range_start<Tz: TimeZone>(range: TimeRange, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let first_day = match range {
        TimeRange::All => return None,
        TimeRange::Today => today,
        TimeRange::ThisWeek => {
            let since_monday = u64::from(today.weekday().num_days_from_monday());
            today.checked_sub_days(Days::new(since_monday))?
        }
        TimeRange::ThisMonth => today.with_day(1)?,
        TimeRange::ThisYear => NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
    };

    Some(local_midnight(&now.timezone(), first_day.and_hms_opt(0, 0, 0)?))
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, midnight: NaiveDateTime) -> DateTime<Utc> {
    // Midnight can fall in a DST gap; take the earliest valid instant
    match tz.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&midnight),
    }
}

/// Apply range filter, then sort, then 1-indexed pagination
///
/// `items` are expected newest first; equal sort keys keep that order.
/// Statistics cover the whole filtered set, not just the page.
pub fn run<Tz: TimeZone>(
    items: &[WatchHistoryItem],
    range: TimeRange,
    sort: SortBy,
    page: usize,
    page_size: usize,
    now: &DateTime<Tz>,
) -> HistoryPage {
    let mut filtered: Vec<WatchHistoryItem> = match range_start(range, now) {
        Some(start) => items
            .iter()
            .filter(|item| item.watch_start >= start)
            .cloned()
            .collect(),
        None => items.to_vec(),
    };

    match sort {
        SortBy::StartTime => filtered.sort_by(|a, b| b.watch_start.cmp(&a.watch_start)),
        SortBy::ChannelName => filtered.sort_by(|a, b| a.channel_name.cmp(&b.channel_name)),
        SortBy::Duration => filtered.sort_by(|a, b| b.duration.cmp(&a.duration)),
    }

    let statistics = stats::compute(&filtered);

    let page_size = page_size.max(1);
    let page = page.max(1);
    let total_items = filtered.len();
    let total_pages = total_items.div_ceil(page_size);

    let items = filtered
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    HistoryPage {
        items,
        statistics,
        pagination: Pagination {
            page,
            page_size,
            total_items,
            total_pages,
        },
    }
}
