//! insight - Zambia Insight analytics CLI
//!
//! Records events into the local store, rebuilds daily page view rollups,
//! and prints reports.

mod render;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use insight_core::analytics::LoadOutcome;
use insight_core::db::AnalyticsStore;
use insight_core::tracking::{
    ClientContext, EventRecorder, FixedSessionId, MemoryStorage, SessionIdProvider, TabSessionId,
};
use insight_core::{Config, Database, EventType, ReportLoader, TimeRange};

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Zambia Insight web analytics")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the analytics report for a time range
    Report {
        /// Time range: 7d, 30d or 90d (defaults to analytics.default_range)
        #[arg(short, long)]
        range: Option<TimeRange>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Record one event
    Record {
        /// Page path the event happened on
        #[arg(short, long)]
        path: String,

        /// Event type: page_view, click, search, download, form_submit
        #[arg(short, long, default_value = "page_view")]
        event: EventType,

        /// Event payload as JSON
        #[arg(short, long)]
        data: Option<String>,

        /// Session to attach the event to (a new session if omitted)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Rebuild the page view rollup for one day from recorded events
    Rollup {
        /// Day to roll up, YYYY-MM-DD (defaults to today, UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show users active right now and their latest page views
    Live {
        /// Look-back in minutes (defaults to analytics.realtime_window_minutes)
        #[arg(short, long)]
        minutes: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        insight_core::logging::init(&config.logging).context("failed to initialize logging")?;
    tracing::info!(command = args.command.name(), "insight starting");

    // Open database
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    let command = args.command.name();
    let result = match args.command {
        Command::Report { range, format } => {
            let range = range.unwrap_or(config.analytics.default_range);
            run_report(db, &config, range, format).await
        }
        Command::Record {
            path,
            event,
            data,
            session,
        } => run_record(db, &config, &path, event, data.as_deref(), session),
        Command::Rollup { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let pages = db
                .rollup_page_views(date)
                .with_context(|| format!("failed to roll up page views for {}", date))?;
            tracing::info!(%date, pages, "Rollup complete");
            println!("Rolled up {} page(s) for {}", pages, date);
            Ok(())
        }
        Command::Live { minutes } => {
            let minutes = minutes.unwrap_or(config.analytics.realtime_window_minutes);
            run_live(&db, minutes)
        }
    };

    match &result {
        Ok(()) => tracing::info!(command, "insight finished"),
        Err(e) => tracing::error!(command, error = %format!("{:#}", e), "insight failed"),
    }
    result
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Report { .. } => "report",
            Command::Record { .. } => "record",
            Command::Rollup { .. } => "rollup",
            Command::Live { .. } => "live",
        }
    }
}

async fn run_report(
    db: Arc<Database>,
    config: &Config,
    range: TimeRange,
    format: OutputFormat,
) -> Result<()> {
    let loader = ReportLoader::from_config(db, &config.analytics);

    let report = match loader.load(range).await {
        Ok(LoadOutcome::Committed(report)) => {
            tracing::info!(
                %range,
                page_views = report.total_page_views,
                sessions = report.total_sessions,
                "Report loaded"
            );
            report
        }
        Ok(LoadOutcome::Superseded) => anyhow::bail!("report load was superseded"),
        Err(e) if e.is_transient() => {
            return Err(e).context("could not load analytics data, try again");
        }
        Err(e) => return Err(e).context("failed to load report"),
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report.as_ref())
                .context("failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", render::report_text(&report, range)),
    }
    Ok(())
}

fn run_record(
    db: Arc<Database>,
    config: &Config,
    path: &str,
    event: EventType,
    data: Option<&str>,
    session: Option<String>,
) -> Result<()> {
    let data = data
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--data must be valid JSON")?;

    // Each invocation is its own tab unless told otherwise
    let session_id = match session {
        Some(id) => id,
        None => TabSessionId::new(MemoryStorage::new()).session_id(),
    };

    let recorder = EventRecorder::new(
        db,
        Arc::new(FixedSessionId(session_id.clone())),
        ClientContext::from_config(&config.tracking),
    );

    if !recorder.record_event(event, path, data) {
        anyhow::bail!("failed to record {} event for {}", event, path);
    }

    println!("Recorded {} {} (session {})", event, path, session_id);
    Ok(())
}

fn run_live(db: &Database, minutes: i64) -> Result<()> {
    let now = Utc::now();
    let lookback = Duration::minutes(minutes.max(1));
    let events = db
        .recent_page_view_events(now - lookback)
        .context("failed to load recent page views")?;

    let users = insight_core::analytics::realtime_users(&events, now, lookback);
    print!("{}", render::live_text(users, &events, now, minutes.max(1)));
    Ok(())
}
