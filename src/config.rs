use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::instagram::client::{DEFAULT_APP_ID, DEFAULT_BASE_URL};
use crate::instagram::fetcher::FetcherConfig;
use crate::instagram::friendships::DEFAULT_PAGE_SIZE;

/// Central configuration loaded from environment variables.
///
/// The session cookie comes from an env var (never hardcoded). The .env
/// file is loaded automatically at startup via dotenvy.
pub struct Config {
    /// Raw `Cookie` header copied from a browser logged in to the site.
    pub session_cookie: String,
    pub base_url: String,
    /// Value of the `x-ig-app-id` header.
    pub app_id: String,
    pub db_path: String,
    /// Pacing and retry policy for every API request.
    pub fetcher: FetcherConfig,
    /// Users requested per listing page.
    pub page_size: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything except the session cookie has a default; the cookie is
    /// only required by commands that talk to the API.
    pub fn load() -> Result<Self> {
        let defaults = FetcherConfig::default();

        let fetcher = FetcherConfig {
            min_delay: env_millis("FOLLOW_TRACKER_MIN_DELAY_MS", defaults.min_delay)?,
            max_delay: env_millis("FOLLOW_TRACKER_MAX_DELAY_MS", defaults.max_delay)?,
            timeout: env_millis("FOLLOW_TRACKER_TIMEOUT_MS", defaults.timeout)?,
            max_retries: env_parse("FOLLOW_TRACKER_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: env_millis("FOLLOW_TRACKER_RETRY_DELAY_MS", defaults.retry_delay)?,
            retry_network_errors: env_parse(
                "FOLLOW_TRACKER_RETRY_NETWORK",
                defaults.retry_network_errors,
            )?,
        };

        if fetcher.max_delay < fetcher.min_delay {
            anyhow::bail!(
                "FOLLOW_TRACKER_MAX_DELAY_MS ({}) is below FOLLOW_TRACKER_MIN_DELAY_MS ({})",
                fetcher.max_delay.as_millis(),
                fetcher.min_delay.as_millis()
            );
        }

        let page_size = env_parse("FOLLOW_TRACKER_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            anyhow::bail!("FOLLOW_TRACKER_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            session_cookie: env::var("IG_SESSION_COOKIE").unwrap_or_default(),
            base_url: env::var("IG_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            app_id: env::var("IG_APP_ID").unwrap_or_else(|_| DEFAULT_APP_ID.to_string()),
            db_path: env::var("FOLLOW_TRACKER_DB_PATH").unwrap_or_else(|_| default_db_path()),
            fetcher,
            page_size,
        })
    }

    /// Check that a session cookie is configured.
    /// Call this before any operation that talks to the API.
    pub fn require_session(&self) -> Result<()> {
        if self.session_cookie.trim().is_empty() {
            anyhow::bail!(
                "IG_SESSION_COOKIE not set. Copy the Cookie header from a browser that is\n\
                 logged in to the site and add it to your .env file."
            );
        }
        Ok(())
    }
}

/// `<data dir>/follow-tracker/history.db`, or `./follow-tracker.db` when the
/// platform has no data directory.
pub fn default_db_path() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("follow-tracker").join("history.db"))
        .unwrap_or_else(|| PathBuf::from("./follow-tracker.db"))
        .to_string_lossy()
        .into_owned()
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    let ms = env_parse(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}
