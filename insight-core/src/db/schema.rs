//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: raw analytics tables
    r#"
    CREATE TABLE IF NOT EXISTS analytics_sessions (
        session_id        TEXT PRIMARY KEY,
        user_id           TEXT,
        device_type       TEXT,
        browser           TEXT,
        operating_system  TEXT,
        referrer          TEXT,
        landing_page      TEXT,
        started_at        TEXT NOT NULL,
        ended_at          TEXT,
        session_duration  INTEGER,
        page_views        INTEGER NOT NULL DEFAULT 0,
        event_count       INTEGER NOT NULL DEFAULT 0,
        is_bounce         INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS analytics_events (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type        TEXT NOT NULL,
        session_id        TEXT NOT NULL,
        user_id           TEXT,
        page_path         TEXT NOT NULL,
        page_title        TEXT,
        referrer          TEXT,
        device_type       TEXT,
        browser           TEXT,
        operating_system  TEXT,
        screen_resolution TEXT,
        country           TEXT,
        created_at        TEXT NOT NULL,
        event_data        JSON NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS analytics_page_views (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        date              TEXT NOT NULL,
        page_path         TEXT NOT NULL,
        page_title        TEXT,
        view_count        INTEGER NOT NULL DEFAULT 0,
        unique_visitors   INTEGER NOT NULL DEFAULT 0,
        created_at        TEXT NOT NULL,
        -- 'rollup' rows are owned by rollup_page_views; anything else is imported
        source            TEXT NOT NULL DEFAULT 'import'
    );

    CREATE INDEX IF NOT EXISTS idx_events_created ON analytics_events(created_at);
    CREATE INDEX IF NOT EXISTS idx_events_type_created ON analytics_events(event_type, created_at);
    CREATE INDEX IF NOT EXISTS idx_events_session ON analytics_events(session_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_started ON analytics_sessions(started_at);
    CREATE INDEX IF NOT EXISTS idx_page_views_date ON analytics_page_views(date);
    CREATE INDEX IF NOT EXISTS idx_page_views_date_path ON analytics_page_views(date, page_path);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
