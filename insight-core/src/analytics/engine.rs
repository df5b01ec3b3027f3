//! Aggregation engine
//!
//! Reduces one window of raw page view, session and event rows into the
//! fixed set of shapes the dashboards render. Aggregation is a pure function
//! of its inputs: the same window and rows always produce the same report.
//!
//! ```text
//!  page_views ─┐
//!  sessions   ─┼─► Aggregator::aggregate(window, ..) ─► AnalyticsReport
//!  events     ─┘
//! ```
//!
//! Rates and percentages are `round(100 * part / total)` with exact halves
//! rounded up, computed in integers, and are 0 whenever `total` is 0.

use super::report::*;
use super::window::AggregationWindow;
use crate::types::{EventRecord, EventType, PageViewRecord, SessionRecord};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use std::collections::{BTreeMap, HashSet};

/// Default length of the ranked lists.
pub const DEFAULT_TOP_N: usize = 10;

/// Default look-back for realtime users.
pub const DEFAULT_REALTIME_MINUTES: i64 = 5;

/// Aggregation settings.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    /// Length of top pages, top referrers and location lists
    pub top_n: usize,
    /// How far back an event counts as "right now"
    pub realtime_window: Duration,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            realtime_window: Duration::minutes(DEFAULT_REALTIME_MINUTES),
        }
    }
}

impl Aggregator {
    pub fn new(top_n: usize, realtime_minutes: i64) -> Self {
        Self {
            top_n,
            realtime_window: Duration::minutes(realtime_minutes),
        }
    }

    /// Build a report from raw rows already fetched for `window`.
    pub fn aggregate(
        &self,
        window: &AggregationWindow,
        page_views: &[PageViewRecord],
        sessions: &[SessionRecord],
        events: &[EventRecord],
    ) -> AnalyticsReport {
        let sessions = distinct_sessions(sessions);

        let total_page_views = page_views.iter().map(|p| p.view_count).sum();
        let unique_visitors = page_views.iter().map(|p| p.unique_visitors).sum();
        let bounced = sessions.iter().filter(|s| s.is_bounce).count();

        AnalyticsReport {
            window_start: window.start,
            window_end: window.end,
            total_page_views,
            unique_visitors,
            total_sessions: sessions.len() as i64,
            average_session_duration: average_duration_secs(&sessions),
            bounce_rate: rate(bounced as i64, sessions.len() as i64),
            top_pages: top_pages(page_views, &sessions, self.top_n),
            top_referrers: top_referrers(events, self.top_n),
            device_stats: breakdown(
                events.iter().map(|e| e.device_type.as_deref()),
                |device_type, count, percentage| DeviceShare {
                    device_type,
                    count,
                    percentage,
                },
            ),
            browser_stats: breakdown(
                events.iter().map(|e| e.browser.as_deref()),
                |browser, count, percentage| BrowserShare {
                    browser,
                    count,
                    percentage,
                },
            ),
            location_stats: breakdown(
                events.iter().map(|e| e.country.as_deref()),
                |country, count, percentage| LocationShare {
                    country,
                    count,
                    percentage,
                },
            )
            .into_iter()
            .take(self.top_n)
            .collect(),
            daily_views: daily_views(page_views, &sessions),
            hourly_views: hourly_views(window, events),
            realtime_users: realtime_users(events, window.now, self.realtime_window),
        }
    }
}

/// Aggregate with default settings.
pub fn aggregate(
    window: &AggregationWindow,
    page_views: &[PageViewRecord],
    sessions: &[SessionRecord],
    events: &[EventRecord],
) -> AnalyticsReport {
    Aggregator::default().aggregate(window, page_views, sessions, events)
}

/// Distinct sessions with a page view in `[now - lookback, now]`.
pub fn realtime_users(events: &[EventRecord], now: DateTime<Utc>, lookback: Duration) -> usize {
    let since = now - lookback;
    events
        .iter()
        .filter(|e| e.event_type == EventType::PageView)
        .filter(|e| e.created_at >= since && e.created_at <= now)
        .map(|e| e.session_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Reduce a raw referrer to the value it is ranked under.
///
/// URL-like values (containing `://`) are reduced to their host; anything
/// else is kept as written. Empty referrers mean direct traffic and return
/// `None`.
pub fn normalize_referrer(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains("://") {
        if let Some(host) = url::Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        {
            return Some(host);
        }
    }

    Some(trimmed.to_string())
}

/// `round(100 * part / total)` with halves rounded up, 0 when `total` is 0.
///
/// Integer arithmetic keeps exact halves exact: 23 of 40 is 57.5% and
/// rounds to 58.
pub fn rate(part: i64, total: i64) -> u32 {
    if total <= 0 {
        return 0;
    }
    ((200 * part + total) / (2 * total)) as u32
}

/// First row wins when the same session id appears twice.
fn distinct_sessions(sessions: &[SessionRecord]) -> Vec<&SessionRecord> {
    let mut seen = HashSet::new();
    sessions
        .iter()
        .filter(|s| seen.insert(s.session_id.as_str()))
        .collect()
}

fn average_duration_secs(sessions: &[&SessionRecord]) -> i64 {
    let durations: Vec<i64> = sessions
        .iter()
        .filter_map(|s| s.session_duration)
        .filter(|&ms| ms > 0)
        .collect();

    if durations.is_empty() {
        return 0;
    }

    let mean_ms = durations.iter().sum::<i64>() as f64 / durations.len() as f64;
    (mean_ms / 1000.0).round() as i64
}

/// Sort by count descending. Ties keep their label order.
fn rank_by_count<K: Ord>(counts: BTreeMap<K, i64>) -> Vec<(K, i64)> {
    let mut ranked: Vec<(K, i64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

fn top_pages(page_views: &[PageViewRecord], sessions: &[&SessionRecord], top_n: usize) -> Vec<TopPage> {
    let mut views: BTreeMap<&str, i64> = BTreeMap::new();
    for row in page_views {
        *views.entry(row.page_path.as_str()).or_insert(0) += row.view_count;
    }

    rank_by_count(views)
        .into_iter()
        .take(top_n)
        .map(|(path, view_count)| {
            let landed: Vec<_> = sessions
                .iter()
                .filter(|s| s.landing_page.as_deref() == Some(path))
                .collect();
            let bounced = landed.iter().filter(|s| s.is_bounce).count();

            TopPage {
                page_path: path.to_string(),
                view_count,
                bounce_rate: rate(bounced as i64, landed.len() as i64),
            }
        })
        .collect()
}

fn top_referrers(events: &[EventRecord], top_n: usize) -> Vec<ReferrerCount> {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for referrer in events
        .iter()
        .filter_map(|e| e.referrer.as_deref())
        .filter_map(normalize_referrer)
    {
        *counts.entry(referrer).or_insert(0) += 1;
    }

    rank_by_count(counts)
        .into_iter()
        .take(top_n)
        .map(|(referrer, count)| ReferrerCount { referrer, count })
        .collect()
}

/// Count occurrences of each non-empty value with its share of the total.
///
/// `row` builds the output row from `(label, count, percentage)`.
fn breakdown<'a, T>(
    values: impl Iterator<Item = Option<&'a str>>,
    row: impl Fn(String, i64, u32) -> T,
) -> Vec<T> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for value in values.flatten().filter(|v| !v.is_empty()) {
        *counts.entry(value).or_insert(0) += 1;
    }

    let total: i64 = counts.values().sum();
    rank_by_count(counts)
        .into_iter()
        .map(|(label, count)| row(label.to_string(), count, rate(count, total)))
        .collect()
}

#[derive(Default)]
struct DayAccumulator<'a> {
    views: i64,
    visitors: i64,
    sessions: HashSet<&'a str>,
    bounced: HashSet<&'a str>,
}

fn daily_views(page_views: &[PageViewRecord], sessions: &[&SessionRecord]) -> Vec<DailyViews> {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();

    for row in page_views {
        let day = days.entry(row.date).or_default();
        day.views += row.view_count;
        day.visitors += row.unique_visitors;
    }

    // Sessions are bucketed by the UTC date of started_at, matching the
    // day boundaries of the page view rollups.
    for session in sessions {
        let day = days.entry(session.started_at.date_naive()).or_default();
        day.sessions.insert(session.session_id.as_str());
        if session.is_bounce {
            day.bounced.insert(session.session_id.as_str());
        }
    }

    days.into_iter()
        .map(|(date, day)| DailyViews {
            date,
            views: day.views,
            visitors: day.visitors,
            sessions: day.sessions.len() as i64,
            bounce_rate: rate(day.bounced.len() as i64, day.sessions.len() as i64),
        })
        .collect()
}

fn hourly_views(window: &AggregationWindow, events: &[EventRecord]) -> Vec<HourlyViews> {
    let today = window.today();
    let mut buckets = [0i64; 24];

    for event in events.iter().filter(|e| e.event_type == EventType::PageView) {
        let local = event.created_at.with_timezone(&window.offset);
        if local.date_naive() == today {
            buckets[local.hour() as usize] += 1;
        }
    }

    buckets
        .iter()
        .enumerate()
        .map(|(hour, &views)| HourlyViews {
            hour: hour as u32,
            views,
        })
        .collect()
}
