// Database schema: table creation.
//
// A `schema_version` table records which schema revision the file was
// created with, so later revisions can migrate existing databases.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema revision.
pub const SCHEMA_VERSION: i64 = 1;

/// Create all tables if they don't exist yet.
///
/// Idempotent, safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Most recent full listing per relation (diff baseline, mutual lookup)
        CREATE TABLE IF NOT EXISTS current_snapshots (
            relation TEXT PRIMARY KEY CHECK (relation IN ('followers', 'following')),
            users_json TEXT NOT NULL,          -- JSON array of users
            user_count INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Follower churn, one row per refresh. Immutable once written.
        CREATE TABLE IF NOT EXISTS delta_events (
            timestamp INTEGER PRIMARY KEY,     -- epoch ms, shared with count_snapshots
            added_json TEXT NOT NULL,
            removed_json TEXT NOT NULL,
            added_count INTEGER NOT NULL,
            removed_count INTEGER NOT NULL
        );

        -- Follower/following totals, one row per refresh
        CREATE TABLE IF NOT EXISTS count_snapshots (
            timestamp INTEGER PRIMARY KEY,     -- epoch ms
            follower_count INTEGER NOT NULL,
            following_count INTEGER NOT NULL
        );

        -- Auxiliary scalars: last error, resolved username, custom tracked id
        CREATE TABLE IF NOT EXISTS app_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
