// HistoryStore trait: async interface over the snapshot and history tables.
//
// All methods are async so a sync backend (rusqlite behind a Mutex) and a
// native async one fit behind the same interface. Every failure carries a
// `TrackerError::Storage` naming the operation, with the backend error
// chained underneath.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{CountSnapshot, DeltaEvent, DeltaTotals, Relation, User};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Snapshots and deltas ---

    /// Diff `current` against the stored followers, replace them, and append
    /// the resulting event at `timestamp`. All or nothing.
    ///
    /// Callers must not run two of these concurrently for the same store.
    async fn save_followers_and_append_delta(
        &self,
        current: &[User],
        timestamp: i64,
    ) -> Result<DeltaEvent>;

    /// Replace the stored following listing. No history is kept for it.
    async fn save_following(&self, current: &[User]) -> Result<()>;

    /// The stored full listing for a relation (empty if none yet).
    async fn current_users(&self, relation: Relation) -> Result<Vec<User>>;

    // --- Count snapshots ---

    /// Insert or replace the snapshot at its timestamp.
    async fn append_count_snapshot(&self, snapshot: &CountSnapshot) -> Result<()>;

    async fn latest_count_snapshot(&self) -> Result<Option<CountSnapshot>>;

    /// Snapshots from the last `max_age_days` days, oldest first.
    async fn count_snapshots_since(&self, max_age_days: u32) -> Result<Vec<CountSnapshot>>;

    // --- History queries ---

    /// At most `max_count` events, newest first.
    async fn delta_events_most_recent(&self, max_count: u32) -> Result<Vec<DeltaEvent>>;

    /// Followers gained and lost over the last `window_days` days.
    async fn follower_count_delta(&self, window_days: u32) -> Result<DeltaTotals>;

    /// Erase both current listings and all history.
    async fn clear_all(&self) -> Result<()>;

    // --- Auxiliary state ---

    async fn get_state(&self, key: &str) -> Result<Option<String>>;

    async fn set_state(&self, key: &str, value: &str) -> Result<()>;

    async fn delete_state(&self, key: &str) -> Result<()>;
}
