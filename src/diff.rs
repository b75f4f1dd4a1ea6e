// Snapshot diffing: turns two full listings into an added/removed delta.
//
// Both inputs are treated as sets keyed by user id. Display fields are
// carried along untouched: `added` takes users from the current listing,
// `removed` takes them from the previous one.

use std::collections::HashSet;

use crate::db::models::User;

/// The set difference between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<User>,
    pub removed: Vec<User>,
}

/// Drop users whose id has already been seen, keeping the first occurrence.
///
/// Pagination can return the same account on two pages; the first copy
/// wins even if later copies carry different display fields.
pub fn deduplicate(users: Vec<User>) -> Vec<User> {
    let mut seen = HashSet::with_capacity(users.len());
    users
        .into_iter()
        .filter(|u| seen.insert(u.id.clone()))
        .collect()
}

/// Compare `previous` against `current`.
///
/// With an empty `previous` (first ever refresh) every current user is
/// reported as added.
pub fn diff(previous: &[User], current: &[User]) -> Diff {
    let previous_ids: HashSet<&str> = previous.iter().map(|u| u.id.as_str()).collect();
    let current_ids: HashSet<&str> = current.iter().map(|u| u.id.as_str()).collect();

    let added = current
        .iter()
        .filter(|u| !previous_ids.contains(u.id.as_str()))
        .cloned()
        .collect();
    let removed = previous
        .iter()
        .filter(|u| !current_ids.contains(u.id.as_str()))
        .cloned()
        .collect();

    Diff { added, removed }
}
