// Switching the tracked account.
//
// History only makes sense for one account, so changing the target always
// wipes the snapshots and the event log. This never happens implicitly.

use anyhow::{Context, Result};
use tracing::info;

use crate::db::models::state_keys;
use crate::db::HistoryStore;
use crate::instagram::users::UserResolver;

/// Track `username` instead of the logged-in user. Returns its user id.
///
/// Lookups still go through the logged-in session, so a missing session
/// identity fails before any request is sent.
pub async fn track_user(
    resolver: &UserResolver,
    store: &dyn HistoryStore,
    username: &str,
) -> Result<String> {
    let username = username.trim().trim_start_matches('@');
    resolver
        .resolve_own_user_id()
        .with_context(|| format!("Cannot track @{username}"))?;
    let user_id = resolver
        .resolve_user_id(username)
        .await
        .with_context(|| format!("Cannot track @{username}"))?;

    store.clear_all().await?;
    store.set_state(state_keys::CUSTOM_USER_ID, &user_id).await?;
    store
        .set_state(state_keys::USERNAME, username)
        .await?;
    store.delete_state(state_keys::LAST_ERROR).await?;

    info!(username = username, user_id = %user_id, "Now tracking a custom account");
    Ok(user_id)
}

/// Go back to tracking the logged-in user.
pub async fn track_self(store: &dyn HistoryStore) -> Result<()> {
    store.clear_all().await?;
    for key in [
        state_keys::CUSTOM_USER_ID,
        state_keys::USERNAME,
        state_keys::LAST_ERROR,
        state_keys::LAST_REFRESH_AT,
    ] {
        store.delete_state(key).await?;
    }
    info!("Now tracking the logged-in account");
    Ok(())
}
