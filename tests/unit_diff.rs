// Unit tests for snapshot diffing and deduplication.
//
// These check the set properties the history relies on: dedup is stable
// and idempotent, added/removed never overlap, and replaying a diff on the
// previous snapshot gives back the current one.

use std::collections::BTreeSet;

use follow_tracker::db::models::User;
use follow_tracker::diff::{deduplicate, diff};

fn users(ids: &[&str]) -> Vec<User> {
    ids.iter().map(|id| User::new(*id, &format!("user{id}"))).collect()
}

fn id_set(users: &[User]) -> BTreeSet<String> {
    users.iter().map(|u| u.id.clone()).collect()
}

// ============================================================
// Deduplication
// ============================================================

#[test]
fn dedupe_keeps_first_occurrence_in_order() {
    let mut input = users(&["3", "1", "3", "2", "1"]);
    input[2].username = "renamed".to_string();

    let out = deduplicate(input);
    let ids: Vec<&str> = out.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "1", "2"]);
    assert_eq!(out[0].username, "user3");
}

#[test]
fn dedupe_is_idempotent() {
    let once = deduplicate(users(&["1", "2", "2", "3", "1", "4"]));
    let twice = deduplicate(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn dedupe_empty_is_empty() {
    assert!(deduplicate(Vec::new()).is_empty());
}

// ============================================================
// Diff properties
// ============================================================

#[test]
fn added_and_removed_are_disjoint() {
    let prev = users(&["1", "2", "3", "4"]);
    let curr = users(&["3", "4", "5", "6"]);
    let d = diff(&prev, &curr);

    let added = id_set(&d.added);
    let removed = id_set(&d.removed);
    assert!(added.is_disjoint(&removed));
}

#[test]
fn diff_reconstructs_current_from_previous() {
    let cases: Vec<(Vec<User>, Vec<User>)> = vec![
        (users(&[]), users(&["1", "2"])),
        (users(&["1", "2"]), users(&[])),
        (users(&["1", "2", "3"]), users(&["2", "3", "4"])),
        (users(&["1", "2"]), users(&["1", "2"])),
        (users(&["9", "8", "7"]), users(&["1", "2", "3"])),
    ];

    for (prev, curr) in cases {
        let d = diff(&prev, &curr);
        let mut rebuilt = id_set(&prev);
        for u in &d.removed {
            rebuilt.remove(&u.id);
        }
        for u in &d.added {
            rebuilt.insert(u.id.clone());
        }
        assert_eq!(rebuilt, id_set(&curr));
    }
}

#[test]
fn identical_snapshots_produce_empty_diff() {
    let snapshot = users(&["1", "2", "3"]);
    let d = diff(&snapshot, &snapshot);
    assert!(d.added.is_empty());
    assert!(d.removed.is_empty());
}

#[test]
fn rename_is_not_a_change() {
    let prev = vec![User::new("1", "old_name")];
    let curr = vec![User::new("1", "new_name")];
    let d = diff(&prev, &curr);
    assert!(d.added.is_empty());
    assert!(d.removed.is_empty());
}

#[test]
fn shifted_listing_reports_one_added_one_removed() {
    let prev = vec![User::new("1", "a"), User::new("2", "b")];
    let curr = vec![User::new("2", "b"), User::new("3", "c")];
    let d = diff(&prev, &curr);
    assert_eq!(d.added, vec![User::new("3", "c")]);
    assert_eq!(d.removed, vec![User::new("1", "a")]);
}

#[test]
fn diff_entries_come_from_the_right_side() {
    // Removed users keep their last known details; added users carry the new ones.
    let mut gone = User::new("1", "gone");
    gone.display_name = "Gone Person".to_string();
    let mut fresh = User::new("2", "fresh");
    fresh.display_name = "Fresh Person".to_string();

    let d = diff(&[gone.clone()], &[fresh.clone()]);
    assert_eq!(d.removed, vec![gone]);
    assert_eq!(d.added, vec![fresh]);
}
