// HTTP transport for the private web API.
//
// A thin reqwest wrapper that sends the session cookie and the fixed
// application id header, and hands back status + raw body. Pacing, timeouts,
// retries and JSON parsing live one layer up in RateLimitedFetcher, which
// talks to this through the Transport trait so it can be driven by a
// scripted fake in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::identity::SessionCookie;
use crate::error::TrackerError;

/// Default base URL of the upstream site.
pub const DEFAULT_BASE_URL: &str = "https://www.instagram.com";

/// Well-known application id the web client sends as `x-ig-app-id`.
pub const DEFAULT_APP_ID: &str = "936619743392459";

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One GET request, no retries, no pacing.
///
/// Implementations return `TrackerError::Network` when no response was
/// received at all; any response, whatever its status, is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, TrackerError>;
}

/// reqwest-backed transport carrying the browser session.
pub struct InstagramClient {
    client: reqwest::Client,
    cookie: SessionCookie,
    app_id: String,
}

impl InstagramClient {
    pub fn new(cookie: SessionCookie, app_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("follow-tracker/0.1")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            cookie,
            app_id: app_id.to_string(),
        })
    }
}

#[async_trait]
impl Transport for InstagramClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TrackerError> {
        debug!(url = url, "GET request");

        let network = |source: reqwest::Error| TrackerError::Network {
            url: url.to_string(),
            source: source.into(),
        };

        let response = self
            .client
            .get(url)
            .header("x-ig-app-id", self.app_id.as_str())
            .header(reqwest::header::COOKIE, self.cookie.header_value())
            .send()
            .await
            .map_err(network)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;

        Ok(HttpResponse { status, body })
    }
}
