//! Database repository layer
//!
//! Provides query and insert operations for events, sessions and page view
//! rollups, and implements [`AnalyticsStore`] on top of them.

use super::AnalyticsStore;
use crate::error::{Error, Result};
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeKind, Table};
use crate::types::*;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Timestamps are stored as fixed-width UTC RFC 3339 strings so that string
/// comparison in SQL matches chronological order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (start, start + Duration::days(1))
}

/// Drop rows that fail to map, logging each one.
///
/// A single malformed row must not fail a whole report.
fn keep_valid<T>(rows: impl Iterator<Item = rusqlite::Result<T>>, table: &'static str) -> Vec<T> {
    rows.filter_map(|row| match row {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(table, error = %e, "Skipping malformed row");
            None
        }
    })
    .collect()
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
    changes: Option<ChangeFeed>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            changes: None,
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            changes: None,
        })
    }

    /// Publish a [`ChangeEvent`] to `feed` after every successful write.
    pub fn with_change_feed(mut self, feed: ChangeFeed) -> Self {
        self.changes = Some(feed);
        self
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        super::schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))
    }

    fn publish(&self, table: Table, kind: ChangeKind, key: String) {
        if let Some(feed) = &self.changes {
            feed.publish(ChangeEvent { table, kind, key });
        }
    }

    // ============================================
    // Event operations
    // ============================================

    /// Append an event, returning its row id.
    pub fn append_event(&self, event: &EventRecord) -> Result<i64> {
        let id = {
            let conn = self.lock()?;
            conn.execute(
                r#"
                INSERT INTO analytics_events (event_type, session_id, user_id, page_path, page_title,
                                              referrer, device_type, browser, operating_system,
                                              screen_resolution, country, created_at, event_data)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                params![
                    event.event_type.as_str(),
                    event.session_id,
                    event.user_id,
                    event.page_path,
                    event.page_title,
                    event.referrer,
                    event.device_type,
                    event.browser,
                    event.operating_system,
                    event.screen_resolution,
                    event.country,
                    format_ts(&event.created_at),
                    event.event_data.to_string(),
                ],
            )?;
            conn.last_insert_rowid()
        };

        self.publish(Table::Events, ChangeKind::Inserted, id.to_string());
        Ok(id)
    }

    fn query_events(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_event)?;
        Ok(keep_valid(rows, "analytics_events"))
    }

    /// Total number of recorded events
    pub fn count_events(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM analytics_events", [], |r| r.get(0))?;
        Ok(count)
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<EventRecord> {
        let event_type_str: String = row.get("event_type")?;
        let created_at_str: String = row.get("created_at")?;
        let event_data_str: Option<String> = row.get("event_data")?;

        let event_type = event_type_str.parse::<EventType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })?;

        Ok(EventRecord {
            event_type,
            session_id: row.get("session_id")?,
            user_id: row.get("user_id")?,
            page_path: row.get("page_path")?,
            page_title: row.get("page_title")?,
            referrer: row.get("referrer")?,
            device_type: row.get("device_type")?,
            browser: row.get("browser")?,
            operating_system: row.get("operating_system")?,
            screen_resolution: row.get("screen_resolution")?,
            country: row.get("country")?,
            created_at: parse_ts(0, &created_at_str)?,
            event_data: event_data_str
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::json!({})),
        })
    }

    // ============================================
    // Session operations
    // ============================================

    /// Get a session by ID
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM analytics_sessions WHERE session_id = ?",
            [session_id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<SessionRecord> {
        let started_at_str: String = row.get("started_at")?;
        let ended_at_str: Option<String> = row.get("ended_at")?;
        let is_bounce: i64 = row.get("is_bounce")?;

        Ok(SessionRecord {
            session_id: row.get("session_id")?,
            user_id: row.get("user_id")?,
            device_type: row.get("device_type")?,
            browser: row.get("browser")?,
            operating_system: row.get("operating_system")?,
            referrer: row.get("referrer")?,
            landing_page: row.get("landing_page")?,
            started_at: parse_ts(0, &started_at_str)?,
            ended_at: ended_at_str
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            session_duration: row.get("session_duration")?,
            is_bounce: is_bounce != 0,
        })
    }

    // ============================================
    // Page view rollups
    // ============================================

    /// Insert a page view row as-is (imports, backfills).
    pub fn insert_page_view(&self, page_view: &PageViewRecord) -> Result<()> {
        {
            let conn = self.lock()?;
            conn.execute(
                r#"
                INSERT INTO analytics_page_views (date, page_path, page_title, view_count,
                                                  unique_visitors, created_at, source)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'import')
                "#,
                params![
                    page_view.date.to_string(),
                    page_view.page_path,
                    page_view.page_title,
                    page_view.view_count,
                    page_view.unique_visitors,
                    format_ts(&Utc::now()),
                ],
            )?;
        }

        self.publish(
            Table::PageViews,
            ChangeKind::Inserted,
            format!("{}:{}", page_view.date, page_view.page_path),
        );
        Ok(())
    }

    /// Rebuild the rollup rows for one UTC day from recorded page view events.
    ///
    /// Replaces rows written by earlier rollups of the same day; imported rows
    /// are left alone. Returns the number of page rows written.
    pub fn rollup_page_views(&self, date: NaiveDate) -> Result<usize> {
        let (start, end) = day_bounds(date);
        let written = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM analytics_page_views WHERE date = ?1 AND source = 'rollup'",
                [date.to_string()],
            )?;
            let written = tx.execute(
                r#"
                INSERT INTO analytics_page_views (date, page_path, page_title, view_count,
                                                  unique_visitors, created_at, source)
                SELECT ?1, page_path, MAX(page_title), COUNT(*), COUNT(DISTINCT session_id), ?4, 'rollup'
                FROM analytics_events
                WHERE event_type = 'page_view' AND created_at >= ?2 AND created_at < ?3
                GROUP BY page_path
                "#,
                params![
                    date.to_string(),
                    format_ts(&start),
                    format_ts(&end),
                    format_ts(&Utc::now()),
                ],
            )?;
            tx.commit()?;
            written
        };

        tracing::info!(%date, pages = written, "Rolled up page views");
        self.publish(Table::PageViews, ChangeKind::Updated, date.to_string());
        Ok(written)
    }

    fn row_to_page_view(row: &Row) -> rusqlite::Result<PageViewRecord> {
        let date_str: String = row.get("date")?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

        Ok(PageViewRecord {
            date,
            page_path: row.get("page_path")?,
            page_title: row.get("page_title")?,
            view_count: row.get("view_count")?,
            unique_visitors: row.get("unique_visitors")?,
        })
    }
}

impl AnalyticsStore for Database {
    fn page_views_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PageViewRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM analytics_page_views WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
        )?;
        let rows = stmt.query_map(
            params![start.to_string(), end.to_string()],
            Self::row_to_page_view,
        )?;
        Ok(keep_valid(rows, "analytics_page_views"))
    }

    fn sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM analytics_sessions
            WHERE started_at >= ?1 AND started_at <= ?2
            ORDER BY started_at ASC
            "#,
        )?;
        let rows = stmt.query_map(
            params![format_ts(&start), format_ts(&end)],
            Self::row_to_session,
        )?;
        Ok(keep_valid(rows, "analytics_sessions"))
    }

    fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<EventRecord>> {
        self.query_events(
            r#"
            SELECT * FROM analytics_events
            WHERE created_at >= ?1 AND created_at <= ?2
            ORDER BY created_at ASC, id ASC
            "#,
            params![format_ts(&start), format_ts(&end)],
        )
    }

    fn recent_page_view_events(&self, since: DateTime<Utc>) -> Result<Vec<EventRecord>> {
        self.query_events(
            r#"
            SELECT * FROM analytics_events
            WHERE event_type = 'page_view' AND created_at >= ?1
            ORDER BY created_at ASC, id ASC
            "#,
            params![format_ts(&since)],
        )
    }

    fn insert_event(&self, event: &EventRecord) -> Result<()> {
        self.append_event(event).map(|_| ())
    }

    fn upsert_session(&self, session: &SessionUpsert) -> Result<()> {
        let kind = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;

            let existing: Option<(String, i64)> = tx
                .query_row(
                    "SELECT started_at, event_count FROM analytics_sessions WHERE session_id = ?",
                    [&session.session_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;

            let page_view_inc = i64::from(session.is_page_view);

            let kind = match existing {
                None => {
                    tx.execute(
                        r#"
                        INSERT INTO analytics_sessions (session_id, user_id, device_type, browser,
                                                        operating_system, referrer, landing_page,
                                                        started_at, ended_at, session_duration,
                                                        page_views, event_count, is_bounce)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, NULL, ?9, 1, ?10)
                        "#,
                        params![
                            session.session_id,
                            session.user_id,
                            session.device_type,
                            session.browser,
                            session.operating_system,
                            session.referrer,
                            session.landing_page,
                            format_ts(&session.ended_at),
                            page_view_inc,
                            session.is_page_view,
                        ],
                    )?;
                    ChangeKind::Inserted
                }
                Some((started_at_str, event_count)) => {
                    let started_at = parse_ts(0, &started_at_str)?;
                    let duration_ms = session
                        .ended_at
                        .signed_duration_since(started_at)
                        .num_milliseconds()
                        .max(0);

                    // A second event of any kind means the visitor interacted.
                    tx.execute(
                        r#"
                        UPDATE analytics_sessions SET
                            ended_at = ?2,
                            landing_page = COALESCE(landing_page, ?3),
                            user_id = COALESCE(user_id, ?4),
                            session_duration = ?5,
                            page_views = page_views + ?6,
                            event_count = ?7,
                            is_bounce = 0
                        WHERE session_id = ?1
                        "#,
                        params![
                            session.session_id,
                            format_ts(&session.ended_at),
                            session.landing_page,
                            session.user_id,
                            duration_ms,
                            page_view_inc,
                            event_count + 1,
                        ],
                    )?;
                    ChangeKind::Updated
                }
            };

            tx.commit()?;
            kind
        };

        self.publish(Table::Sessions, kind, session.session_id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeFilter;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn create_test_event(session_id: &str, event_type: EventType, path: &str, ts: DateTime<Utc>) -> EventRecord {
        EventRecord {
            event_type,
            session_id: session_id.to_string(),
            user_id: None,
            page_path: path.to_string(),
            page_title: Some("Zambia Insight".to_string()),
            referrer: Some("https://www.google.com/".to_string()),
            device_type: Some("desktop".to_string()),
            browser: Some("Chrome".to_string()),
            operating_system: Some("Windows".to_string()),
            screen_resolution: None,
            country: Some("ZM".to_string()),
            created_at: ts,
            event_data: serde_json::json!({}),
        }
    }

    fn create_test_upsert(session_id: &str, path: &str, is_page_view: bool, ts: DateTime<Utc>) -> SessionUpsert {
        SessionUpsert {
            session_id: session_id.to_string(),
            user_id: None,
            device_type: Some("desktop".to_string()),
            browser: Some("Chrome".to_string()),
            operating_system: Some("Windows".to_string()),
            referrer: None,
            landing_page: is_page_view.then(|| path.to_string()),
            ended_at: ts,
            is_page_view,
        }
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_event_insert_and_range_query() {
        let db = test_db();
        db.insert_event(&create_test_event("s1", EventType::PageView, "/", at(9, 0))).unwrap();
        db.insert_event(&create_test_event("s1", EventType::Click, "/", at(10, 0))).unwrap();
        db.insert_event(&create_test_event("s2", EventType::PageView, "/", at(12, 0))).unwrap();

        let events = db.events_between(at(9, 0), at(10, 0)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventType::Click);
        assert_eq!(events[0].country.as_deref(), Some("ZM"));
        assert_eq!(db.count_events().unwrap(), 3);

        let recent = db.recent_page_view_events(at(9, 30)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].session_id, "s2");
    }

    #[test]
    fn test_malformed_event_row_is_skipped() {
        let db = test_db();
        db.insert_event(&create_test_event("s1", EventType::PageView, "/", at(9, 0))).unwrap();
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO analytics_events (event_type, session_id, page_path, created_at)
                 VALUES ('scroll', 's1', '/', ?1)",
                [format_ts(&at(9, 5))],
            )
            .unwrap();

        let events = db.events_between(at(0, 0), at(23, 0)).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_session_upsert_inserts_then_merges() {
        let db = test_db();

        db.upsert_session(&create_test_upsert("s1", "/health", true, at(9, 0))).unwrap();
        let session = db.get_session("s1").unwrap().unwrap();
        assert_eq!(session.landing_page.as_deref(), Some("/health"));
        assert_eq!(session.started_at, at(9, 0));
        assert!(session.session_duration.is_none());
        assert!(session.is_bounce);

        // Later page view must not replace the landing page
        db.upsert_session(&create_test_upsert("s1", "/economy", true, at(9, 2))).unwrap();
        let session = db.get_session("s1").unwrap().unwrap();
        assert_eq!(session.landing_page.as_deref(), Some("/health"));
        assert_eq!(session.ended_at, Some(at(9, 2)));
        assert_eq!(session.session_duration, Some(120_000));
        assert!(!session.is_bounce);
    }

    #[test]
    fn test_session_started_by_click_fills_landing_page_later() {
        let db = test_db();

        db.upsert_session(&create_test_upsert("s1", "/", false, at(9, 0))).unwrap();
        let session = db.get_session("s1").unwrap().unwrap();
        assert!(session.landing_page.is_none());
        assert!(!session.is_bounce);

        db.upsert_session(&create_test_upsert("s1", "/agriculture", true, at(9, 1))).unwrap();
        let session = db.get_session("s1").unwrap().unwrap();
        assert_eq!(session.landing_page.as_deref(), Some("/agriculture"));
    }

    #[test]
    fn test_sessions_between() {
        let db = test_db();
        db.upsert_session(&create_test_upsert("early", "/", true, at(1, 0))).unwrap();
        db.upsert_session(&create_test_upsert("late", "/", true, at(20, 0))).unwrap();

        let sessions = db.sessions_between(at(0, 0), at(12, 0)).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "early");
    }

    #[test]
    fn test_rollup_page_views() {
        let db = test_db();
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();

        db.insert_event(&create_test_event("s1", EventType::PageView, "/", at(9, 0))).unwrap();
        db.insert_event(&create_test_event("s1", EventType::PageView, "/", at(9, 5))).unwrap();
        db.insert_event(&create_test_event("s2", EventType::PageView, "/", at(10, 0))).unwrap();
        db.insert_event(&create_test_event("s2", EventType::PageView, "/provinces", at(10, 1))).unwrap();
        db.insert_event(&create_test_event("s2", EventType::Click, "/provinces", at(10, 2))).unwrap();

        assert_eq!(db.rollup_page_views(day).unwrap(), 2);
        // Running again replaces rather than duplicates
        assert_eq!(db.rollup_page_views(day).unwrap(), 2);

        let rows = db.page_views_between(day, day).unwrap();
        assert_eq!(rows.len(), 2);
        let home = rows.iter().find(|r| r.page_path == "/").unwrap();
        assert_eq!(home.view_count, 3);
        assert_eq!(home.unique_visitors, 2);
    }

    #[test]
    fn test_rollup_keeps_imported_rows() {
        let db = test_db();
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        db.insert_page_view(&PageViewRecord {
            date: day,
            page_path: "/legacy".to_string(),
            page_title: None,
            view_count: 7,
            unique_visitors: 4,
        })
        .unwrap();

        db.rollup_page_views(day).unwrap();
        let rows = db.page_views_between(day, day).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].view_count, 7);
    }

    #[test]
    fn test_writes_publish_changes() {
        let feed = ChangeFeed::new(16);
        let db = test_db().with_change_feed(feed.clone());
        let mut sub = feed.subscribe(ChangeFilter::table(Table::Sessions));

        db.insert_event(&create_test_event("s1", EventType::PageView, "/", at(9, 0))).unwrap();
        db.upsert_session(&create_test_upsert("s1", "/", true, at(9, 0))).unwrap();
        db.upsert_session(&create_test_upsert("s1", "/", false, at(9, 1))).unwrap();

        let first = sub.try_recv().unwrap();
        assert_eq!(first.kind, ChangeKind::Inserted);
        assert_eq!(first.key, "s1");
        assert_eq!(sub.try_recv().unwrap().kind, ChangeKind::Updated);
        assert!(sub.try_recv().is_none());
    }
}
