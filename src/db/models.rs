// Data models: the types that flow between the API client, the diff
// engine and the history store.
//
// They live apart from the queries so other modules can use them without
// depending on rusqlite directly.

use serde::{Deserialize, Serialize};

/// An account as seen in a followers/following listing.
///
/// Identity is `id` alone. `username` and `display_name` can change between
/// observations and are never used as keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
}

impl User {
    pub fn new(id: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            display_name: String::new(),
        }
    }
}

/// Which listing of the tracked account we're talking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Followers,
    Following,
}

impl Relation {
    /// Path segment used by the friendships endpoint and as the storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Followers => "followers",
            Relation::Following => "following",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Follower/following totals recorded once per refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountSnapshot {
    /// Epoch milliseconds. Shared with the DeltaEvent of the same refresh.
    pub timestamp: i64,
    pub follower_count: u32,
    pub following_count: u32,
}

/// Followers gained and lost between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEvent {
    pub timestamp: i64,
    pub added: Vec<User>,
    pub removed: Vec<User>,
}

impl DeltaEvent {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Sums of added/removed followers over a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaTotals {
    pub added: u64,
    pub removed: u64,
}

/// Keys for the auxiliary key/value area.
pub mod state_keys {
    /// Full chained message of the last failed refresh.
    pub const LAST_ERROR: &str = "last_error";
    /// Username resolved for the tracked account.
    pub const USERNAME: &str = "username";
    /// Manually chosen tracked-user id (overrides the session identity).
    pub const CUSTOM_USER_ID: &str = "custom_user_id";
    /// When the last refresh completed (epoch ms).
    pub const LAST_REFRESH_AT: &str = "last_refresh_at";
}
