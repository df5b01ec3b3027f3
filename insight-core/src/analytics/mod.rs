//! Analytics module for insight
//!
//! Turns raw events, sessions and daily page view rollups into the report
//! the dashboards render:
//! - Totals (page views, visitors, sessions, average duration, bounce rate)
//! - Rankings (top pages, referrers, devices, browsers, locations)
//! - Daily and hourly series
//! - Realtime user count
//!
//! [`engine`] is the pure aggregation step. [`loader`] fetches the rows for a
//! window and commits the result, discarding loads that were superseded
//! while in flight.

pub mod engine;
pub mod loader;
pub mod report;
pub mod window;

pub use engine::{aggregate, normalize_referrer, realtime_users, Aggregator};
pub use loader::{LoadOutcome, ReportLoader};
pub use report::{
    AnalyticsReport, BrowserShare, CategoryShare, DailyViews, DeviceShare, HourlyViews,
    LocationShare, ReferrerCount, TopPage,
};
pub use window::{offset_from_minutes, AggregationWindow, TimeRange};
