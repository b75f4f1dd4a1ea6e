// Followers/following listing with cursor pagination.
//
// The friendships endpoint returns a page of users plus `has_more` and a
// `next_max_id` continuation token. Pages are strict: a missing field fails
// the whole page rather than skipping the offending entry, and a failed
// page fails the whole enumeration. A partial listing would show up as a
// wave of bogus unfollows in the history.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use super::fetcher::RateLimitedFetcher;
use super::json_id;
use crate::db::models::{Relation, User};
use crate::diff::deduplicate;
use crate::error::TrackerError;

/// Page size the web client uses for follow lists.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub users: Vec<User>,
    /// Token for the next page, `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Walks the friendships listing for a user.
pub struct FriendshipPager {
    fetcher: Arc<RateLimitedFetcher>,
    base_url: String,
    page_size: u32,
}

impl FriendshipPager {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, base_url: &str, page_size: u32) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size,
        }
    }

    /// Build the listing URL for one page.
    pub fn page_url(&self, user_id: &str, relation: Relation, cursor: Option<&str>) -> Result<Url> {
        let base = format!(
            "{}/api/v1/friendships/{}/{}",
            self.base_url,
            user_id,
            relation.as_str()
        );
        let page_size = self.page_size.to_string();
        let mut params = vec![
            ("count", page_size.as_str()),
            ("search_surface", "follow_list_page"),
        ];
        if let Some(cursor) = cursor {
            params.push(("max_id", cursor));
        }
        Url::parse_with_params(&base, &params)
            .with_context(|| format!("Invalid friendships URL for user {user_id}"))
    }

    /// Fetch a single page.
    pub async fn get_page(
        &self,
        user_id: &str,
        relation: Relation,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let url = self.page_url(user_id, relation, cursor)?;

        let body = self
            .fetcher
            .fetch_json(url.as_str())
            .await
            .with_context(|| format!("Failed to fetch {relation} page for user {user_id}"))?;

        parse_page(&body)
            .with_context(|| format!("Unexpected {relation} page for user {user_id}"))
    }

    /// Fetch every page and return the deduplicated listing.
    ///
    /// Users seen on an earlier page win over later copies.
    pub async fn fetch_all(&self, user_id: &str, relation: Relation) -> Result<Vec<User>> {
        let mut users = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut pages = 0u32;

        loop {
            let page = self.get_page(user_id, relation, cursor.as_deref()).await?;
            pages += 1;

            debug!(
                page = pages,
                page_size = page.users.len(),
                total = users.len() + page.users.len(),
                "Fetched {} page for user {}",
                relation,
                user_id
            );

            users.extend(page.users);

            // A cursor seen before means the listing loops back on itself.
            match page.next_cursor {
                None => break,
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    return Err(TrackerError::malformed(format!(
                        "{relation} cursor {next} was already visited"
                    )))
                    .with_context(|| format!("Failed to list {relation} for user {user_id}"));
                }
                Some(next) => cursor = Some(next),
            }
        }

        let fetched = users.len();
        let users = deduplicate(users);

        info!(
            relation = relation.as_str(),
            user_id = user_id,
            pages = pages,
            count = users.len(),
            duplicates = fetched - users.len(),
            "Collected {}",
            relation
        );

        Ok(users)
    }
}

/// Validate a friendships response and turn it into a Page.
pub fn parse_page(body: &Value) -> Result<Page, TrackerError> {
    let entries = body
        .get("users")
        .and_then(Value::as_array)
        .ok_or_else(|| TrackerError::malformed("missing `users` array"))?;

    let users = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_user(entry, index))
        .collect::<Result<Vec<_>, _>>()?;

    let has_more = body
        .get("has_more")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let next_cursor = if has_more {
        let token = body.get("next_max_id").and_then(json_id).unwrap_or_default();
        if token.is_empty() {
            return Err(TrackerError::malformed(
                "`has_more` is set but `next_max_id` is empty",
            ));
        }
        Some(token)
    } else {
        None
    };

    Ok(Page { users, next_cursor })
}

fn parse_user(entry: &Value, index: usize) -> Result<User, TrackerError> {
    let id = entry
        .get("id")
        .or_else(|| entry.get("pk"))
        .and_then(json_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| TrackerError::malformed(format!("user #{index} has no `id`")))?;

    let username = entry
        .get("username")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| TrackerError::malformed(format!("user #{index} (id {id}) has no `username`")))?;

    let display_name = entry
        .get("full_name")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(User {
        id,
        username: username.to_string(),
        display_name: display_name.to_string(),
    })
}
