//! # insight-core
//!
//! Core library for Zambia Insight - web analytics for the Zambia Insight
//! portal.
//!
//! This library provides:
//! - Domain types for events, sessions and daily page view rollups
//! - Event capture: session identity, user agent classification, recording
//! - Database storage layer with SQLite
//! - Report aggregation and loading
//! - A realtime change feed
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Capture:** the recorder appends events and keeps session rows current
//! - **Store:** SQLite tables behind the [`db::AnalyticsStore`] trait, with
//!   daily page view rollups derived from events
//! - **Report:** the loader fetches one window of rows and the engine reduces
//!   them to an [`analytics::AnalyticsReport`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use insight_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{AnalyticsReport, ReportLoader, TimeRange};
pub use config::Config;
pub use db::{AnalyticsStore, Database};
pub use error::{Error, Result};
pub use realtime::{ChangeEvent, ChangeFeed, ChangeFilter};
pub use tracking::EventRecorder;
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod realtime;
pub mod tracking;
pub mod types;
