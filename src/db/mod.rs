// Database layer: SQLite storage for snapshots, follower history and
// auxiliary state.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. The database file lives wherever FOLLOW_TRACKER_DB_PATH points
// (defaults to the platform data directory).

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteHistoryStore;
pub use traits::HistoryStore;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// Open (or create) the database and create tables.
///
/// This is the main entry point, called by `follow-tracker init` and by
/// any command that needs database access.
pub fn initialize(db_path: &str) -> Result<Connection> {
    // Create parent directories if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // WAL keeps readers (status, history) from blocking a running refresh
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing database (fails if it doesn't exist yet).
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `follow-tracker init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Create the database if needed and wrap it as a HistoryStore.
pub fn initialize_store(db_path: &str) -> Result<Arc<dyn HistoryStore>> {
    let conn = initialize(db_path)?;
    Ok(Arc::new(SqliteHistoryStore::new(conn)))
}

/// Open an existing database as a HistoryStore.
pub fn open_store(db_path: &str) -> Result<Arc<dyn HistoryStore>> {
    let conn = open(db_path)?;
    Ok(Arc::new(SqliteHistoryStore::new(conn)))
}
