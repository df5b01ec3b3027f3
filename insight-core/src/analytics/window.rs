//! Report windows and time range presets.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Time range presets offered by the dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl TimeRange {
    pub fn days(&self) -> i64 {
        match self {
            TimeRange::Week => 7,
            TimeRange::Month => 30,
            TimeRange::Quarter => 90,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
            TimeRange::Quarter => "90d",
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TimeRange {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            "90d" => Ok(TimeRange::Quarter),
            _ => Err(crate::error::Error::UnknownTimeRange(s.to_string())),
        }
    }
}

/// Inputs that pin down a report besides the raw rows.
///
/// Aggregation reads no clock of its own: `now` decides what "today" and
/// "right now" mean, and `offset` decides which local day and hour an event
/// falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
}

impl AggregationWindow {
    /// Window `[start, end]` evaluated at `now`, in UTC.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            now,
            offset: Utc.fix(),
        }
    }

    /// The last `range.days()` days up to `now`.
    pub fn ending_now(range: TimeRange, now: DateTime<Utc>) -> Self {
        Self::new(now - Duration::days(range.days()), now, now)
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// First day of the window for day-granular rows.
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Last day of the window for day-granular rows.
    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    /// Calendar day of `now` in the window's offset.
    pub fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.offset).date_naive()
    }
}

/// Offset for `minutes` east of UTC, or the machine's offset when `None`.
pub fn offset_from_minutes(minutes: Option<i32>) -> FixedOffset {
    minutes
        .and_then(|m| FixedOffset::east_opt(m * 60))
        .unwrap_or_else(|| *Local::now().offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_range_parse() {
        assert_eq!("30d".parse::<TimeRange>().unwrap(), TimeRange::Month);
        assert_eq!(TimeRange::Quarter.days(), 90);
        assert!("1y".parse::<TimeRange>().is_err());
    }

    #[test]
    fn test_ending_now() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let window = AggregationWindow::ending_now(TimeRange::Week, now);
        assert_eq!(window.start_date(), NaiveDate::from_ymd_opt(2026, 10, 11).unwrap());
        assert_eq!(window.end_date(), NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
    }

    #[test]
    fn test_today_respects_offset() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 23, 30, 0).unwrap();
        let window = AggregationWindow::new(now, now, now)
            .with_offset(FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(window.today(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    }

    #[test]
    fn test_offset_from_minutes() {
        assert_eq!(offset_from_minutes(Some(120)).local_minus_utc(), 7200);
    }
}
