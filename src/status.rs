// System status display: database, tracked account, latest counts,
// recent churn and the last refresh error.

use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;

use crate::db::models::state_keys;
use crate::db::HistoryStore;
use crate::output::terminal::{format_timestamp, format_totals};
use crate::output::truncate_chars;

/// How much of the last error to show before pointing at `last-error`.
const ERROR_PREVIEW_CHARS: usize = 160;

/// Display system status to the terminal.
pub async fn show(store: &Arc<dyn HistoryStore>, db_path: &str) -> Result<()> {
    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_path, file_size);

    // Tracked account
    let username = store.get_state(state_keys::USERNAME).await?;
    let custom = store.get_state(state_keys::CUSTOM_USER_ID).await?;
    let who = username
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "(not resolved yet)".to_string());
    match custom {
        Some(id) => println!("Tracking: {who} (custom account, id {id})"),
        None => println!("Tracking: {who} (logged-in account)"),
    }

    // Latest counts
    match store.latest_count_snapshot().await? {
        Some(snap) => println!(
            "Counts: {} followers, {} following (as of {})",
            snap.follower_count,
            snap.following_count,
            format_timestamp(snap.timestamp)
        ),
        None => {
            println!("Counts: none recorded yet");
            println!("  Run `follow-tracker refresh` to take the first snapshot");
        }
    }

    let week = store.follower_count_delta(7).await?;
    println!("Followers: {}", format_totals(&week, 7));

    match store.get_state(state_keys::LAST_REFRESH_AT).await? {
        Some(ts) => match ts.parse::<i64>() {
            Ok(ms) => println!("Last refresh: {}", format_timestamp(ms)),
            Err(_) => println!("Last refresh: {ts}"),
        },
        None => println!("Last refresh: never"),
    }

    if let Some(error) = store.get_state(state_keys::LAST_ERROR).await? {
        println!(
            "{} {}",
            "Last refresh failed:".red().bold(),
            truncate_chars(&error, ERROR_PREVIEW_CHARS)
        );
        if error.chars().count() > ERROR_PREVIEW_CHARS {
            println!("  {}", "Run `follow-tracker last-error` for the full message".dimmed());
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
