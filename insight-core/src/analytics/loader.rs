//! Report loading
//!
//! Fetches the raw rows for a window concurrently and hands them to the
//! aggregation engine. When several loads overlap (a user flipping between
//! time ranges), only the most recently *started* load may commit; earlier
//! ones finish and are discarded as [`LoadOutcome::Superseded`].

use super::engine::Aggregator;
use super::report::AnalyticsReport;
use super::window::{AggregationWindow, TimeRange};
use crate::config::AnalyticsConfig;
use crate::db::AnalyticsStore;
use crate::error::{Error, Result};
use chrono::{FixedOffset, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Result of one load.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// This load was the latest and its report is now current.
    Committed(Arc<AnalyticsReport>),
    /// A newer load started while this one was in flight.
    Superseded,
}

impl LoadOutcome {
    pub fn report(&self) -> Option<&Arc<AnalyticsReport>> {
        match self {
            LoadOutcome::Committed(report) => Some(report),
            LoadOutcome::Superseded => None,
        }
    }
}

/// Loads reports from a store, keeping the last committed one.
pub struct ReportLoader {
    store: Arc<dyn AnalyticsStore>,
    aggregator: Aggregator,
    offset: FixedOffset,
    latest_ticket: AtomicU64,
    committed: Mutex<Option<Arc<AnalyticsReport>>>,
}

impl ReportLoader {
    pub fn new(store: Arc<dyn AnalyticsStore>, aggregator: Aggregator, offset: FixedOffset) -> Self {
        Self {
            store,
            aggregator,
            offset,
            latest_ticket: AtomicU64::new(0),
            committed: Mutex::new(None),
        }
    }

    /// Loader configured from the `[analytics]` config section.
    pub fn from_config(store: Arc<dyn AnalyticsStore>, config: &AnalyticsConfig) -> Self {
        Self::new(
            store,
            Aggregator::new(config.top_n, config.realtime_window_minutes),
            super::window::offset_from_minutes(config.utc_offset_minutes),
        )
    }

    /// Load the report for the last `range` up to now.
    pub async fn load(&self, range: TimeRange) -> Result<LoadOutcome> {
        let window = AggregationWindow::ending_now(range, Utc::now()).with_offset(self.offset);
        self.load_window(window).await
    }

    /// Load the report for an explicit window.
    ///
    /// Fetch failures are returned as [`Error::Fetch`] and leave the current
    /// report untouched.
    pub async fn load_window(&self, window: AggregationWindow) -> Result<LoadOutcome> {
        let ticket = self.next_ticket();
        debug!(ticket, start = %window.start, end = %window.end, "Loading report");

        let start_date = window.start_date();
        let end_date = window.end_date();
        let (start, end) = (window.start, window.end);
        let since = window.now - self.aggregator.realtime_window;

        let (page_views, sessions, events, recent) = tokio::try_join!(
            self.spawn_fetch("page views", move |s| s.page_views_between(start_date, end_date)),
            self.spawn_fetch("sessions", move |s| s.sessions_between(start, end)),
            self.spawn_fetch("events", move |s| s.events_between(start, end)),
            self.spawn_fetch("realtime events", move |s| s.recent_page_view_events(since)),
        )?;

        let mut report = self.aggregator.aggregate(&window, &page_views, &sessions, &events);
        // The window's events may end before "now"; count realtime users
        // from their own query.
        report.realtime_users =
            super::engine::realtime_users(&recent, window.now, self.aggregator.realtime_window);

        self.commit(ticket, report)
    }

    fn next_ticket(&self) -> u64 {
        self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make `report` current if `ticket` is still the latest load.
    ///
    /// The ticket is compared while the commit lock is held, so a stale load
    /// can never overwrite a report committed by a newer one.
    fn commit(&self, ticket: u64, report: AnalyticsReport) -> Result<LoadOutcome> {
        let mut committed = self
            .committed
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;

        if self.latest_ticket.load(Ordering::SeqCst) != ticket {
            debug!(ticket, "Discarding superseded report");
            return Ok(LoadOutcome::Superseded);
        }

        let report = Arc::new(report);
        *committed = Some(Arc::clone(&report));
        Ok(LoadOutcome::Committed(report))
    }

    /// The most recently committed report, if any.
    pub fn current(&self) -> Option<Arc<AnalyticsReport>> {
        self.committed.lock().ok().and_then(|guard| guard.clone())
    }

    async fn spawn_fetch<T, F>(&self, what: &'static str, fetch: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn AnalyticsStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let joined = tokio::task::spawn_blocking(move || fetch(store.as_ref())).await;

        match joined {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => {
                warn!(what, error = %e, "Fetch failed");
                Err(Error::Fetch {
                    what,
                    message: e.to_string(),
                })
            }
            Err(e) => {
                warn!(what, error = %e, "Fetch task failed");
                Err(Error::Fetch {
                    what,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventRecord, EventType, PageViewRecord, SessionRecord, SessionUpsert};
    use chrono::{DateTime, Duration, NaiveDate, Offset, TimeZone};
    use std::time::Duration as StdDuration;

    /// Store whose page view fetch sleeps for a configurable time and
    /// reports the delay as its view count.
    struct SlowStore {
        delays_ms: Mutex<Vec<u64>>,
        fail: bool,
    }

    impl SlowStore {
        fn new(delays_ms: Vec<u64>) -> Self {
            Self {
                delays_ms: Mutex::new(delays_ms),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                delays_ms: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl AnalyticsStore for SlowStore {
        fn page_views_between(&self, start: NaiveDate, _end: NaiveDate) -> Result<Vec<PageViewRecord>> {
            if self.fail {
                return Err(Error::Config("store offline".to_string()));
            }
            let delay = self.delays_ms.lock().unwrap().remove(0);
            std::thread::sleep(StdDuration::from_millis(delay));
            Ok(vec![PageViewRecord {
                date: start,
                page_path: "/".to_string(),
                page_title: None,
                view_count: delay as i64,
                unique_visitors: 1,
            }])
        }

        fn sessions_between(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
            Ok(Vec::new())
        }

        fn events_between(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<EventRecord>> {
            Ok(Vec::new())
        }

        fn recent_page_view_events(&self, since: DateTime<Utc>) -> Result<Vec<EventRecord>> {
            Ok(vec![EventRecord {
                event_type: EventType::PageView,
                session_id: "live".to_string(),
                user_id: None,
                page_path: "/".to_string(),
                page_title: None,
                referrer: None,
                device_type: None,
                browser: None,
                operating_system: None,
                screen_resolution: None,
                country: None,
                created_at: since + Duration::seconds(30),
                event_data: serde_json::json!({}),
            }])
        }

        fn insert_event(&self, _: &EventRecord) -> Result<()> {
            Ok(())
        }

        fn upsert_session(&self, _: &SessionUpsert) -> Result<()> {
            Ok(())
        }
    }

    fn window() -> AggregationWindow {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        AggregationWindow::ending_now(TimeRange::Week, now)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_latest_load_wins() {
        // First load is slow, second is fast
        let store = Arc::new(SlowStore::new(vec![300, 10]));
        let loader = Arc::new(ReportLoader::new(store, Aggregator::default(), Utc.fix()));

        let slow = {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.load_window(window()).await })
        };
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let fast = loader.load_window(window()).await.unwrap();

        let fast_report = fast.report().expect("latest load commits").clone();
        assert_eq!(fast_report.total_page_views, 10);

        let slow = slow.await.unwrap().unwrap();
        assert!(matches!(slow, LoadOutcome::Superseded));

        let current = loader.current().unwrap();
        assert_eq!(current.total_page_views, 10);
    }

    #[test]
    fn test_stale_commit_after_newer_commit_is_discarded() {
        let loader = ReportLoader::new(Arc::new(SlowStore::new(Vec::new())), Aggregator::default(), Utc.fix());
        let empty = |views| {
            let mut report = Aggregator::default().aggregate(&window(), &[], &[], &[]);
            report.total_page_views = views;
            report
        };

        let older = loader.next_ticket();
        let newer = loader.next_ticket();

        assert!(matches!(loader.commit(newer, empty(2)).unwrap(), LoadOutcome::Committed(_)));
        assert!(matches!(loader.commit(older, empty(1)).unwrap(), LoadOutcome::Superseded));
        assert_eq!(loader.current().unwrap().total_page_views, 2);
    }

    #[tokio::test]
    async fn test_realtime_users_from_recent_query() {
        let store = Arc::new(SlowStore::new(vec![0]));
        let loader = ReportLoader::new(store, Aggregator::default(), Utc.fix());

        let outcome = loader.load_window(window()).await.unwrap();
        assert_eq!(outcome.report().unwrap().realtime_users, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_transient_and_keeps_current() {
        let loader = ReportLoader::new(Arc::new(SlowStore::failing()), Aggregator::default(), Utc.fix());

        let err = loader.load_window(window()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("page views"));
        assert!(loader.current().is_none());
    }
}
