//! Plain text rendering of reports for the terminal.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use insight_core::analytics::{AnalyticsReport, CategoryShare};
use insight_core::format::{format_count, format_duration_secs, format_hour, format_relative_time};
use insight_core::{EventRecord, TimeRange};

const RECENT_LIMIT: usize = 10;

pub fn report_text(report: &AnalyticsReport, range: TimeRange) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Zambia Insight report ({})", range);
    let _ = writeln!(
        out,
        "Window: {} .. {}",
        report.window_start.format("%Y-%m-%d %H:%M"),
        report.window_end.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Page views:       {}", format_count(report.total_page_views));
    let _ = writeln!(out, "Unique visitors:  {}", format_count(report.unique_visitors));
    let _ = writeln!(out, "Sessions:         {}", format_count(report.total_sessions));
    let _ = writeln!(
        out,
        "Avg. session:     {}",
        format_duration_secs(report.average_session_duration)
    );
    let _ = writeln!(out, "Bounce rate:      {}%", report.bounce_rate);
    let _ = writeln!(out, "Realtime users:   {}", report.realtime_users);

    let _ = writeln!(out, "\nTop pages");
    if report.top_pages.is_empty() {
        let _ = writeln!(out, "  (no page views)");
    }
    for page in &report.top_pages {
        let _ = writeln!(
            out,
            "  {:<32} {:>8} views  bounce {:>3}%",
            page.page_path,
            format_count(page.view_count),
            page.bounce_rate
        );
    }

    let _ = writeln!(out, "\nTop referrers");
    if report.top_referrers.is_empty() {
        let _ = writeln!(out, "  (direct traffic only)");
    }
    for referrer in &report.top_referrers {
        let _ = writeln!(out, "  {:<32} {:>8}", referrer.referrer, format_count(referrer.count));
    }

    write_shares(&mut out, "Devices", &report.device_stats);
    write_shares(&mut out, "Browsers", &report.browser_stats);
    write_shares(&mut out, "Locations", &report.location_stats);

    if !report.daily_views.is_empty() {
        let _ = writeln!(out, "\nDaily");
        let _ = writeln!(out, "  {:<10} {:>8} {:>8} {:>8} {:>6}", "date", "views", "visitors", "sessions", "bounce");
        for day in &report.daily_views {
            let _ = writeln!(
                out,
                "  {:<10} {:>8} {:>8} {:>8} {:>5}%",
                day.date.format("%Y-%m-%d"),
                day.views,
                day.visitors,
                day.sessions,
                day.bounce_rate
            );
        }
    }

    match report.peak_hour() {
        Some(hour) => {
            let _ = writeln!(out, "\nToday by hour (peak {})", format_hour(hour));
            for bucket in report.hourly_views.iter().filter(|h| h.views > 0) {
                let _ = writeln!(out, "  {}  {}", format_hour(bucket.hour), bucket.views);
            }
        }
        None => {
            let _ = writeln!(out, "\nNo page views today");
        }
    }

    out
}

fn write_shares<S: CategoryShare>(out: &mut String, title: &str, shares: &[S]) {
    if shares.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{}", title);
    for share in shares {
        let _ = writeln!(
            out,
            "  {:<20} {:>8} {:>4}%",
            share.label(),
            format_count(share.count()),
            share.percentage()
        );
    }
}

pub fn live_text(users: usize, events: &[EventRecord], now: DateTime<Utc>, minutes: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Active users (last {} min): {}", minutes, users);

    for event in events.iter().rev().take(RECENT_LIMIT) {
        let _ = writeln!(
            out,
            "  {:>8}  {:<32} {}",
            format_relative_time(event.created_at, now),
            event.page_path,
            event.session_id
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::analytics::{aggregate, AggregationWindow};

    #[test]
    fn test_empty_report_renders() {
        let now = Utc::now();
        let report = aggregate(&AggregationWindow::ending_now(TimeRange::Week, now), &[], &[], &[]);
        let text = report_text(&report, TimeRange::Week);
        assert!(text.contains("Zambia Insight report (7d)"));
        assert!(text.contains("Bounce rate:      0%"));
        assert!(text.contains("No page views today"));
    }

    #[test]
    fn test_breakdowns_render_under_their_titles() {
        let now = Utc::now();
        let mut report = aggregate(&AggregationWindow::ending_now(TimeRange::Week, now), &[], &[], &[]);
        report.device_stats.push(insight_core::analytics::DeviceShare {
            device_type: "tablet".to_string(),
            count: 3,
            percentage: 100,
        });
        let text = report_text(&report, TimeRange::Week);
        assert!(text.contains("\nDevices\n  tablet"));
        assert!(!text.contains("Browsers"));
    }

    #[test]
    fn test_live_text_header() {
        let text = live_text(0, &[], Utc::now(), 5);
        assert_eq!(text, "Active users (last 5 min): 0\n");
    }
}
