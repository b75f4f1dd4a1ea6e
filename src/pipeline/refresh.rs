// Refresh cycle: one full pass over the tracked account's follow lists.
//
// 1. Work out who we're tracking (custom id, else the session identity)
// 2. Resolve their current username
// 3. Page through followers, then following
// 4. Persist the follower delta, the following listing, the counts and
//    the username
//
// Both listings are fetched before anything is written, so a failure in
// either leaves the stored state untouched. Every refresh stamps all of its
// rows with one timestamp picked at the start.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::db::models::{state_keys, CountSnapshot, DeltaEvent, Relation, User};
use crate::db::HistoryStore;
use crate::instagram::friendships::FriendshipPager;
use crate::instagram::users::UserResolver;

/// What one successful refresh recorded.
#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub user_id: String,
    pub username: String,
    pub counts: CountSnapshot,
    pub delta: DeltaEvent,
}

/// The account to track: the stored custom id, or the logged-in user.
///
/// A session identity is required either way; without one no request is
/// sent, even when a custom id is stored.
pub async fn resolve_target(resolver: &UserResolver, store: &dyn HistoryStore) -> Result<String> {
    let own_id = resolver
        .resolve_own_user_id()
        .context("Cannot tell which account to track")?;
    match store.get_state(state_keys::CUSTOM_USER_ID).await? {
        Some(custom) => Ok(custom),
        None => Ok(own_id),
    }
}

/// Run a refresh stamped with the current time.
///
/// On failure the full error chain is saved as the last error; on success
/// the last error is cleared.
pub async fn run(
    pager: &FriendshipPager,
    resolver: &UserResolver,
    store: &Arc<dyn HistoryStore>,
) -> Result<RefreshSummary> {
    run_at(pager, resolver, store, Utc::now().timestamp_millis()).await
}

/// Run a refresh whose rows are all stamped with `timestamp` (epoch ms).
pub async fn run_at(
    pager: &FriendshipPager,
    resolver: &UserResolver,
    store: &Arc<dyn HistoryStore>,
    timestamp: i64,
) -> Result<RefreshSummary> {
    let result = refresh(pager, resolver, store.as_ref(), timestamp)
        .await
        .context("Refresh failed");

    match &result {
        Ok(summary) => {
            store.delete_state(state_keys::LAST_ERROR).await?;
            store
                .set_state(state_keys::LAST_REFRESH_AT, &timestamp.to_string())
                .await?;
            info!(
                user_id = %summary.user_id,
                followers = summary.counts.follower_count,
                following = summary.counts.following_count,
                added = summary.delta.added.len(),
                removed = summary.delta.removed.len(),
                "Refresh complete"
            );
        }
        Err(e) => {
            if let Err(save_err) = store
                .set_state(state_keys::LAST_ERROR, &format!("{e:#}"))
                .await
            {
                warn!(error = %save_err, "Failed to record last error");
            }
        }
    }

    result
}

async fn refresh(
    pager: &FriendshipPager,
    resolver: &UserResolver,
    store: &dyn HistoryStore,
    timestamp: i64,
) -> Result<RefreshSummary> {
    let user_id = resolve_target(resolver, store).await?;

    let username = resolver.resolve_username(&user_id).await?;

    let followers = fetch_with_spinner(pager, &user_id, &username, Relation::Followers).await?;
    let following = fetch_with_spinner(pager, &user_id, &username, Relation::Following).await?;

    let delta = store
        .save_followers_and_append_delta(&followers, timestamp)
        .await
        .context("Failed to save followers")?;
    store
        .save_following(&following)
        .await
        .context("Failed to save following")?;

    let counts = CountSnapshot {
        timestamp,
        follower_count: followers.len() as u32,
        following_count: following.len() as u32,
    };
    store
        .append_count_snapshot(&counts)
        .await
        .context("Failed to save counts")?;
    store.set_state(state_keys::USERNAME, &username).await?;

    Ok(RefreshSummary {
        user_id,
        username,
        counts,
        delta,
    })
}

async fn fetch_with_spinner(
    pager: &FriendshipPager,
    user_id: &str,
    username: &str,
    relation: Relation,
) -> Result<Vec<User>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("  {spinner} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Fetching {relation} of @{username}"));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = pager
        .fetch_all(user_id, relation)
        .await
        .with_context(|| format!("Failed to fetch {relation}"));

    spinner.finish_and_clear();
    result
}
