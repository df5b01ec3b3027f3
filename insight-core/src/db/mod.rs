//! Database layer for insight
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - The [`AnalyticsStore`] read/write contract the recorder and loader depend on
//! - Daily page view rollups

pub mod repo;
pub mod schema;

pub use repo::Database;

use crate::error::Result;
use crate::types::{EventRecord, PageViewRecord, SessionRecord, SessionUpsert};
use chrono::{DateTime, NaiveDate, Utc};

/// Read and write contract between the analytics core and its data store.
///
/// All ranges are inclusive on both ends. Implementations must be safe to
/// call from several threads at once; the loader issues its reads
/// concurrently.
pub trait AnalyticsStore: Send + Sync {
    /// Page view rollup rows with `date` in `[start, end]`.
    fn page_views_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PageViewRecord>>;

    /// Sessions with `started_at` in `[start, end]`.
    fn sessions_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<Vec<SessionRecord>>;

    /// Events with `created_at` in `[start, end]`.
    fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<EventRecord>>;

    /// Page view events created at or after `since`.
    fn recent_page_view_events(&self, since: DateTime<Utc>) -> Result<Vec<EventRecord>>;

    /// Append one event.
    fn insert_event(&self, event: &EventRecord) -> Result<()>;

    /// Insert the session if absent, else merge `ended_at` and an unset
    /// `landing_page` into the existing row.
    fn upsert_session(&self, session: &SessionUpsert) -> Result<()>;
}
