//! Core domain types for insight
//!
//! These are the shapes the recorder writes and the aggregation engine reads.
//! The store is authoritative; nothing here is ever deleted by the core.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | Events sharing one `session_id`, from first event until the tab closes or goes idle |
//! | **Bounce** | A session with a single page view and no further interaction |
//! | **Page view rollup** | One row per (day, page) with view and visitor counts |
//! | **Window** | The `[start, end]` range a report covers |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Event types
// ============================================

/// Kind of interaction captured by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    Click,
    Search,
    Download,
    FormSubmit,
}

impl EventType {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::Click => "click",
            EventType::Search => "search",
            EventType::Download => "download",
            EventType::FormSubmit => "form_submit",
        }
    }

    /// All event types, in storage order.
    pub fn all() -> [EventType; 5] {
        [
            EventType::PageView,
            EventType::Click,
            EventType::Search,
            EventType::Download,
            EventType::FormSubmit,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_view" => Ok(EventType::PageView),
            "click" => Ok(EventType::Click),
            "search" => Ok(EventType::Search),
            "download" => Ok(EventType::Download),
            "form_submit" => Ok(EventType::FormSubmit),
            _ => Err(crate::error::Error::UnknownEventType(s.to_string())),
        }
    }
}

// ============================================
// Device classification
// ============================================

/// Device class derived from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Raw records
// ============================================

/// Daily page view rollup row.
///
/// Several rows may exist for the same `(date, page_path)`; readers sum
/// them rather than picking one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewRecord {
    /// Day the views were counted for
    pub date: NaiveDate,
    /// Path of the page, e.g. "/provinces/lusaka"
    pub page_path: String,
    /// Document title at the time of the view
    pub page_title: Option<String>,
    /// Number of views
    pub view_count: i64,
    /// Distinct visitors for this row only
    pub unique_visitors: i64,
}

/// One browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique per browser session; the join key across all records
    pub session_id: String,
    /// Signed-in user, if any
    pub user_id: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub operating_system: Option<String>,
    pub referrer: Option<String>,
    /// First page viewed in the session
    pub landing_page: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Milliseconds between `started_at` and `ended_at`
    pub session_duration: Option<i64>,
    pub is_bounce: bool,
}

/// One captured interaction. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventType,
    pub session_id: String,
    pub user_id: Option<String>,
    pub page_path: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub operating_system: Option<String>,
    pub screen_resolution: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Opaque key-value payload (always a JSON object)
    pub event_data: serde_json::Value,
}

/// Fields known to the recorder when it touches a session.
///
/// Applied as "insert if absent, else merge": an existing session keeps its
/// `started_at`, client fields and landing page (if already set), and takes
/// the new `ended_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpsert {
    pub session_id: String,
    pub user_id: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub operating_system: Option<String>,
    pub referrer: Option<String>,
    /// Set only for page views; never overwrites an existing landing page
    pub landing_page: Option<String>,
    pub ended_at: DateTime<Utc>,
    /// Whether the triggering event was a page view
    pub is_page_view: bool,
}
