// Database queries: every SQL statement lives here.
//
// Plain functions over a Connection so the store wrapper stays thin and
// tests can drive them directly against an in-memory database.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{CountSnapshot, DeltaEvent, DeltaTotals, Relation, User};
use crate::diff::{deduplicate, diff};

// --- Current snapshots ---

/// Load the stored full listing for a relation (empty if never saved).
pub fn load_current(conn: &Connection, relation: Relation) -> Result<Vec<User>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT users_json FROM current_snapshots WHERE relation = ?1",
            params![relation.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => serde_json::from_str(&json)
            .with_context(|| format!("Corrupt stored {relation} snapshot")),
        None => Ok(Vec::new()),
    }
}

/// Overwrite the stored full listing for a relation.
///
/// The caller passes a deduplicated listing.
pub fn save_current(conn: &Connection, relation: Relation, users: &[User]) -> Result<()> {
    let json = serde_json::to_string(users)?;
    conn.execute(
        "INSERT INTO current_snapshots (relation, users_json, user_count, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(relation) DO UPDATE SET
            users_json = ?2,
            user_count = ?3,
            updated_at = datetime('now')",
        params![relation.as_str(), json, users.len() as i64],
    )?;
    Ok(())
}

// --- Delta events ---

/// Diff `current` against the stored followers, store `current`, and append
/// the delta, all in one transaction.
///
/// Timestamps must increase: a timestamp at or before the newest stored
/// event is rejected and nothing is written.
pub fn save_followers_and_append_delta(
    conn: &mut Connection,
    current: &[User],
    timestamp: i64,
) -> Result<DeltaEvent> {
    let tx = conn.transaction()?;

    if let Some(latest) = latest_delta_timestamp(&tx)? {
        if timestamp <= latest {
            anyhow::bail!(
                "Refusing to append delta at {timestamp}: newest stored event is at {latest}"
            );
        }
    }

    let current = deduplicate(current.to_vec());
    let previous = load_current(&tx, Relation::Followers)?;
    let delta = diff(&previous, &current);

    save_current(&tx, Relation::Followers, &current)?;

    let event = DeltaEvent {
        timestamp,
        added: delta.added,
        removed: delta.removed,
    };
    insert_delta_event(&tx, &event)?;

    tx.commit().context("Failed to commit follower snapshot")?;
    Ok(event)
}

/// Append a delta event row.
pub fn insert_delta_event(conn: &Connection, event: &DeltaEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO delta_events (timestamp, added_json, removed_json, added_count, removed_count)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.timestamp,
            serde_json::to_string(&event.added)?,
            serde_json::to_string(&event.removed)?,
            event.added.len() as i64,
            event.removed.len() as i64,
        ],
    )?;
    Ok(())
}

pub fn latest_delta_timestamp(conn: &Connection) -> Result<Option<i64>> {
    let latest: Option<i64> =
        conn.query_row("SELECT MAX(timestamp) FROM delta_events", [], |row| row.get(0))?;
    Ok(latest)
}

/// The newest `limit` delta events, newest first.
pub fn delta_events_most_recent(conn: &Connection, limit: u32) -> Result<Vec<DeltaEvent>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, added_json, removed_json
         FROM delta_events
         ORDER BY timestamp DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (timestamp, added_json, removed_json) = row?;
        events.push(DeltaEvent {
            timestamp,
            added: serde_json::from_str(&added_json)
                .with_context(|| format!("Corrupt delta event at {timestamp}"))?,
            removed: serde_json::from_str(&removed_json)
                .with_context(|| format!("Corrupt delta event at {timestamp}"))?,
        });
    }
    Ok(events)
}

/// Total followers gained and lost in events at or after `since_ms`.
pub fn follower_count_delta(conn: &Connection, since_ms: i64) -> Result<DeltaTotals> {
    let (added, removed): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(added_count), 0), COALESCE(SUM(removed_count), 0)
         FROM delta_events
         WHERE timestamp >= ?1",
        params![since_ms],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(DeltaTotals {
        added: added.max(0) as u64,
        removed: removed.max(0) as u64,
    })
}

// --- Count snapshots ---

/// Insert a count snapshot, replacing any row with the same timestamp.
pub fn upsert_count_snapshot(conn: &Connection, snapshot: &CountSnapshot) -> Result<()> {
    conn.execute(
        "INSERT INTO count_snapshots (timestamp, follower_count, following_count)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(timestamp) DO UPDATE SET
            follower_count = ?2,
            following_count = ?3",
        params![
            snapshot.timestamp,
            snapshot.follower_count,
            snapshot.following_count
        ],
    )?;
    Ok(())
}

pub fn latest_count_snapshot(conn: &Connection) -> Result<Option<CountSnapshot>> {
    let snapshot = conn
        .query_row(
            "SELECT timestamp, follower_count, following_count
             FROM count_snapshots
             ORDER BY timestamp DESC
             LIMIT 1",
            [],
            |row| {
                Ok(CountSnapshot {
                    timestamp: row.get(0)?,
                    follower_count: row.get(1)?,
                    following_count: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(snapshot)
}

/// Count snapshots at or after `since_ms`, oldest first.
pub fn count_snapshots_since(conn: &Connection, since_ms: i64) -> Result<Vec<CountSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, follower_count, following_count
         FROM count_snapshots
         WHERE timestamp >= ?1
         ORDER BY timestamp ASC",
    )?;

    let rows = stmt.query_map(params![since_ms], |row| {
        Ok(CountSnapshot {
            timestamp: row.get(0)?,
            follower_count: row.get(1)?,
            following_count: row.get(2)?,
        })
    })?;

    let mut snapshots = Vec::new();
    for row in rows {
        snapshots.push(row?);
    }
    Ok(snapshots)
}

// --- Reset ---

/// Erase both current snapshots and all history. Auxiliary state is kept.
pub fn clear_all(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "DELETE FROM current_snapshots;
         DELETE FROM delta_events;
         DELETE FROM count_snapshots;",
    )?;
    tx.commit().context("Failed to commit reset")?;
    Ok(())
}

// --- Auxiliary state ---

/// Get an auxiliary value by key (e.g. "last_error").
pub fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM app_state WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(result)
}

/// Set an auxiliary value (upsert).
pub fn set_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO app_state (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_state(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM app_state WHERE key = ?1", params![key])?;
    Ok(())
}
