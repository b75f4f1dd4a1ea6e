// SqliteHistoryStore: rusqlite backend implementing the HistoryStore trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// Holding the lock for the whole read-diff-write keeps a single store
// instance from interleaving two follower saves.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{CountSnapshot, DeltaEvent, DeltaTotals, Relation, User};
use super::queries;
use super::traits::HistoryStore;
use crate::diff::deduplicate;
use crate::error::storage;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Start of a window reaching `days` back from now, in epoch ms.
fn window_start(days: u32) -> i64 {
    Utc::now().timestamp_millis() - i64::from(days) * MS_PER_DAY
}

pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn).map_err(storage("table_count"))
    }

    async fn save_followers_and_append_delta(
        &self,
        current: &[User],
        timestamp: i64,
    ) -> Result<DeltaEvent> {
        let mut conn = self.conn.lock().await;
        queries::save_followers_and_append_delta(&mut conn, current, timestamp)
            .map_err(storage("save_followers_and_append_delta"))
    }

    async fn save_following(&self, current: &[User]) -> Result<()> {
        let current = deduplicate(current.to_vec());
        let conn = self.conn.lock().await;
        queries::save_current(&conn, Relation::Following, &current)
            .map_err(storage("save_following"))
    }

    async fn current_users(&self, relation: Relation) -> Result<Vec<User>> {
        let conn = self.conn.lock().await;
        queries::load_current(&conn, relation).map_err(storage("current_users"))
    }

    async fn append_count_snapshot(&self, snapshot: &CountSnapshot) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::upsert_count_snapshot(&conn, snapshot).map_err(storage("append_count_snapshot"))
    }

    async fn latest_count_snapshot(&self) -> Result<Option<CountSnapshot>> {
        let conn = self.conn.lock().await;
        queries::latest_count_snapshot(&conn).map_err(storage("latest_count_snapshot"))
    }

    async fn count_snapshots_since(&self, max_age_days: u32) -> Result<Vec<CountSnapshot>> {
        let since = window_start(max_age_days);
        let conn = self.conn.lock().await;
        queries::count_snapshots_since(&conn, since).map_err(storage("count_snapshots_since"))
    }

    async fn delta_events_most_recent(&self, max_count: u32) -> Result<Vec<DeltaEvent>> {
        let conn = self.conn.lock().await;
        queries::delta_events_most_recent(&conn, max_count)
            .map_err(storage("delta_events_most_recent"))
    }

    async fn follower_count_delta(&self, window_days: u32) -> Result<DeltaTotals> {
        let since = window_start(window_days);
        let conn = self.conn.lock().await;
        queries::follower_count_delta(&conn, since).map_err(storage("follower_count_delta"))
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        queries::clear_all(&mut conn).map_err(storage("clear_all"))
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        queries::get_state(&conn, key).map_err(storage("get_state"))
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::set_state(&conn, key, value).map_err(storage("set_state"))
    }

    async fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::delete_state(&conn, key).map_err(storage("delete_state"))
    }
}
