//! Chart-ready report shapes produced by the aggregation engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Everything the analytics dashboards render for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,

    // Totals
    /// Sum of `view_count` over all page view rows
    pub total_page_views: i64,
    /// Sum of per-row `unique_visitors`; a visitor counted on two rows is
    /// counted twice
    pub unique_visitors: i64,
    /// Distinct sessions started in the window
    pub total_sessions: i64,
    /// Mean duration in whole seconds over sessions with a non-zero duration
    pub average_session_duration: i64,
    /// Percentage (0-100) of sessions that bounced
    pub bounce_rate: u32,

    // Rankings
    pub top_pages: Vec<TopPage>,
    pub top_referrers: Vec<ReferrerCount>,
    pub device_stats: Vec<DeviceShare>,
    pub browser_stats: Vec<BrowserShare>,
    pub location_stats: Vec<LocationShare>,

    // Series
    /// One entry per day with data, oldest first
    pub daily_views: Vec<DailyViews>,
    /// Always 24 entries, hour 0 first
    pub hourly_views: Vec<HourlyViews>,

    /// Distinct sessions with a page view in the realtime window
    pub realtime_users: usize,
}

/// A page and how often it was viewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopPage {
    pub page_path: String,
    pub view_count: i64,
    /// Bounce rate of sessions that landed on this page
    pub bounce_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferrerCount {
    pub referrer: String,
    pub count: i64,
}

/// Device type row of the device breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceShare {
    pub device_type: String,
    pub count: i64,
    /// Share of the breakdown total, rounded to the nearest integer
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowserShare {
    pub browser: String,
    pub count: i64,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationShare {
    pub country: String,
    pub count: i64,
    pub percentage: u32,
}

/// Read access shared by the breakdown rows, whatever their category key.
pub trait CategoryShare {
    fn label(&self) -> &str;
    fn count(&self) -> i64;
    fn percentage(&self) -> u32;
}

impl CategoryShare for DeviceShare {
    fn label(&self) -> &str {
        &self.device_type
    }

    fn count(&self) -> i64 {
        self.count
    }

    fn percentage(&self) -> u32 {
        self.percentage
    }
}

impl CategoryShare for BrowserShare {
    fn label(&self) -> &str {
        &self.browser
    }

    fn count(&self) -> i64 {
        self.count
    }

    fn percentage(&self) -> u32 {
        self.percentage
    }
}

impl CategoryShare for LocationShare {
    fn label(&self) -> &str {
        &self.country
    }

    fn count(&self) -> i64 {
        self.count
    }

    fn percentage(&self) -> u32 {
        self.percentage
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyViews {
    pub date: NaiveDate,
    pub views: i64,
    pub visitors: i64,
    pub sessions: i64,
    pub bounce_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyViews {
    pub hour: u32,
    pub views: i64,
}

impl AnalyticsReport {
    /// Busiest hour of today, if there were any page views.
    pub fn peak_hour(&self) -> Option<u32> {
        self.hourly_views
            .iter()
            .filter(|h| h.views > 0)
            .max_by_key(|h| (h.views, std::cmp::Reverse(h.hour)))
            .map(|h| h.hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_breakdown_rows_use_category_keys() {
        let device = DeviceShare {
            device_type: "mobile".to_string(),
            count: 1,
            percentage: 100,
        };
        let browser = BrowserShare {
            browser: "Chrome".to_string(),
            count: 2,
            percentage: 50,
        };
        let location = LocationShare {
            country: "Zambia".to_string(),
            count: 3,
            percentage: 75,
        };

        assert_eq!(
            serde_json::to_value(&device).unwrap(),
            json!({ "device_type": "mobile", "count": 1, "percentage": 100 })
        );
        assert_eq!(serde_json::to_value(&browser).unwrap()["browser"], "Chrome");
        assert_eq!(serde_json::to_value(&location).unwrap()["country"], "Zambia");
        assert_eq!(location.label(), "Zambia");
    }
}
