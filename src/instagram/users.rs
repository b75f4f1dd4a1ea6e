// User resolution: session identity, id → username, username → id.
//
// Each lookup is a single round-trip through the shared fetcher. Missing
// fields are reported as MalformedResponse with the lookup named in the
// context, never defaulted.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use super::fetcher::RateLimitedFetcher;
use super::identity::IdentityProvider;
use super::json_id;
use crate::error::TrackerError;

pub struct UserResolver {
    fetcher: Arc<RateLimitedFetcher>,
    identity: Arc<dyn IdentityProvider>,
    base_url: String,
}

impl UserResolver {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        identity: Arc<dyn IdentityProvider>,
        base_url: &str,
    ) -> Self {
        Self {
            fetcher,
            identity,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The logged-in user's id, from the session identity. No request is made.
    pub fn resolve_own_user_id(&self) -> Result<String> {
        self.identity.session_user_id().ok_or_else(|| {
            TrackerError::Auth(
                "no `ds_user_id` cookie in the session. Log in on the site in this browser first"
                    .to_string(),
            )
            .into()
        })
    }

    /// Look up the current username for a user id.
    pub async fn resolve_username(&self, user_id: &str) -> Result<String> {
        let url = format!("{}/api/v1/users/{}/info/", self.base_url, user_id);

        let body = self
            .fetcher
            .fetch_json(&url)
            .await
            .with_context(|| format!("Failed to look up user info for id {user_id}"))?;

        let username = username_from_info(&body)
            .with_context(|| format!("Failed to resolve username for id {user_id}"))?;

        debug!(user_id = user_id, username = %username, "Resolved username");
        Ok(username)
    }

    /// Look up the user id behind a username.
    pub async fn resolve_user_id(&self, username: &str) -> Result<String> {
        let username = username.trim().trim_start_matches('@');
        let url = Url::parse_with_params(
            &format!("{}/api/v1/users/web_profile_info/", self.base_url),
            &[("username", username)],
        )
        .with_context(|| format!("Invalid profile URL for @{username}"))?;

        let body = self
            .fetcher
            .fetch_json(url.as_str())
            .await
            .with_context(|| format!("Failed to look up profile for @{username}"))?;

        let user_id = user_id_from_profile(&body)
            .with_context(|| format!("Failed to resolve user id for @{username}"))?;

        debug!(username = username, user_id = %user_id, "Resolved user id");
        Ok(user_id)
    }
}

/// `{user: {username}}` → username.
pub fn username_from_info(body: &Value) -> Result<String, TrackerError> {
    body.get("user")
        .and_then(|user| user.get("username"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TrackerError::malformed("missing `user.username`"))
}

/// `{data: {user: {id}}}` → id (string or number).
pub fn user_id_from_profile(body: &Value) -> Result<String, TrackerError> {
    body.get("data")
        .and_then(|data| data.get("user"))
        .and_then(|user| user.get("id"))
        .and_then(json_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| TrackerError::malformed("missing `data.user.id`"))
}
