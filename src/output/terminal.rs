// Colored terminal output for follower history and counts.
//
// This module handles all terminal-specific formatting: colors, tables,
// timestamps. The main.rs commands delegate here.

use std::collections::HashSet;

use chrono::{Local, TimeZone};
use colored::Colorize;

use crate::db::models::{CountSnapshot, DeltaEvent, DeltaTotals, User};
use crate::pipeline::refresh::RefreshSummary;

/// Format an epoch-ms timestamp in local time.
pub fn format_timestamp(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("@{timestamp_ms}"),
    }
}

/// Render a user as `@username (Display Name)`.
pub fn format_user(user: &User) -> String {
    if user.display_name.is_empty() {
        format!("@{}", user.username)
    } else {
        format!("@{} ({})", user.username, user.display_name)
    }
}

/// Signed change, e.g. "+3" / "-2" / "0".
fn signed(delta: i64) -> String {
    if delta > 0 {
        format!("+{delta}")
    } else {
        delta.to_string()
    }
}

/// Display the outcome of a refresh.
pub fn display_refresh_summary(summary: &RefreshSummary) {
    println!(
        "\n{}",
        format!("=== Refreshed @{} ===", summary.username).bold()
    );
    println!(
        "  Followers: {}   Following: {}",
        summary.counts.follower_count, summary.counts.following_count
    );

    let delta = &summary.delta;
    if delta.is_empty() {
        println!("  {}", "No follower changes since the last refresh.".dimmed());
        return;
    }
    for user in &delta.added {
        println!("  {} {}", "+".green().bold(), format_user(user));
    }
    for user in &delta.removed {
        println!("  {} {}", "-".red().bold(), format_user(user));
    }
}

/// Display follower history, newest first.
///
/// `following_ids` marks removed followers the tracked account still
/// follows, the ones most worth a second look.
pub fn display_history(events: &[DeltaEvent], following_ids: &HashSet<&str>) {
    if events.is_empty() {
        println!("No history yet. Run `follow-tracker refresh` first.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Follower History ({} refreshes) ===", events.len()).bold()
    );

    for event in events {
        let when = format_timestamp(event.timestamp);
        if event.is_empty() {
            println!("\n  {}  {}", when.dimmed(), "no changes".dimmed());
            continue;
        }
        println!(
            "\n  {}  {} {}",
            when.bold(),
            format!("+{}", event.added.len()).green(),
            format!("-{}", event.removed.len()).red(),
        );
        for user in &event.added {
            println!("    {} {}", "followed".green(), format_user(user));
        }
        for user in &event.removed {
            let mutual = if following_ids.contains(user.id.as_str()) {
                format!("  {}", "(you still follow them)".yellow())
            } else {
                String::new()
            };
            println!("    {} {}{}", "unfollowed".red(), format_user(user), mutual);
        }
    }
    println!();
}

/// Display count snapshots, oldest first, with the change per refresh.
pub fn display_counts(snapshots: &[CountSnapshot], days: u32) {
    if snapshots.is_empty() {
        println!("No counts recorded in the last {days} days.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Counts, last {days} days ===").bold()
    );
    println!(
        "  {:<18} {:>10} {:>8} {:>10} {:>8}",
        "When".dimmed(),
        "Followers".dimmed(),
        "".dimmed(),
        "Following".dimmed(),
        "".dimmed(),
    );
    println!("  {}", "-".repeat(58).dimmed());

    let mut previous: Option<&CountSnapshot> = None;
    for snap in snapshots {
        let (follower_change, following_change) = match previous {
            Some(prev) => (
                signed(i64::from(snap.follower_count) - i64::from(prev.follower_count)),
                signed(i64::from(snap.following_count) - i64::from(prev.following_count)),
            ),
            None => (String::new(), String::new()),
        };
        println!(
            "  {:<18} {:>10} {:>8} {:>10} {:>8}",
            format_timestamp(snap.timestamp),
            snap.follower_count,
            follower_change,
            snap.following_count,
            following_change,
        );
        previous = Some(snap);
    }
    println!();
}

/// One-line summary of follower churn over a window.
pub fn format_totals(totals: &DeltaTotals, days: u32) -> String {
    format!(
        "{} / {} over {days} days",
        format!("+{}", totals.added).green(),
        format!("-{}", totals.removed).red(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_user() {
        let mut user = User::new("1", "alice");
        assert_eq!(format_user(&user), "@alice");
        user.display_name = "Alice A.".to_string();
        assert_eq!(format_user(&user), "@alice (Alice A.)");
    }

    #[test]
    fn test_signed() {
        assert_eq!(signed(3), "+3");
        assert_eq!(signed(0), "0");
        assert_eq!(signed(-2), "-2");
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(1_700_000_000_000);
        // YYYY-MM-DD HH:MM
        assert_eq!(formatted.len(), 16);
        assert_eq!(&formatted[4..5], "-");
    }
}
