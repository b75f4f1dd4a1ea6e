// Paced, retrying JSON fetcher for the private web API.
//
// Two things keep us under the upstream's anti-automation radar:
//
// 1. Spacing. Before every dispatch we draw a random delay from
//    [min_delay, max_delay] and sleep whatever is left of it since the
//    previous dispatch. Only the last dispatch instant is tracked, so this is
//    a single throttle per fetcher, not a token bucket.
// 2. Bounded retries. Timeouts and 5xx responses are retried after a fixed
//    back-off, sharing one retry budget. Everything else fails at once.
//
// The retry loop is an explicit state machine so the "budget exactly
// exhausted" edge is easy to see and to test.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::client::{HttpResponse, Transport};
use crate::error::TrackerError;

/// Pacing and retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Lower bound of the random inter-dispatch delay.
    pub min_delay: Duration,
    /// Upper bound of the random inter-dispatch delay.
    pub max_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries allowed after the first attempt (shared by timeouts and 5xx).
    pub max_retries: u32,
    /// Fixed wait before each retry.
    pub retry_delay: Duration,
    /// Also retry when no response was received at all.
    pub retry_network_errors: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(4000),
            timeout: Duration::from_millis(15000),
            max_retries: 5,
            retry_delay: Duration::from_millis(3000),
            retry_network_errors: false,
        }
    }
}

impl FetcherConfig {
    /// Draw the spacing for the next dispatch, uniformly in the window.
    ///
    /// An inverted window (max < min) collapses to `min_delay`.
    fn draw_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = (self.max_delay.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// States of one request's retry loop.
#[derive(Debug)]
enum RetryState {
    Attempting { retries_left: u32 },
    WaitingRetry { retries_left: u32, cause: TrackerError },
    Succeeded(HttpResponse),
    Failed(TrackerError),
}

impl RetryState {
    /// Where an attempt's outcome leads.
    fn after_attempt(
        result: Result<HttpResponse, TrackerError>,
        retries_left: u32,
        retry_network_errors: bool,
    ) -> Self {
        match result {
            Ok(response) => RetryState::Succeeded(response),
            Err(cause) if retries_left > 0 && cause.is_retryable(retry_network_errors) => {
                RetryState::WaitingRetry {
                    retries_left,
                    cause,
                }
            }
            Err(cause) => RetryState::Failed(cause),
        }
    }
}

/// Issues GET requests with spacing, timeout and retry.
///
/// The last-dispatch instant is owned by the instance; two fetchers pace
/// independently of each other.
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    config: FetcherConfig,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimitedFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: FetcherConfig) -> Self {
        Self {
            transport,
            config,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Fetch `url` and parse the 2xx body as JSON.
    ///
    /// The JSON is returned as-is; checking its shape is the caller's job.
    pub async fn fetch_json(&self, url: &str) -> Result<Value, TrackerError> {
        let response = self.get_with_retry(url).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| TrackerError::malformed(format!("response body is not JSON: {e}")))
    }

    async fn get_with_retry(&self, url: &str) -> Result<HttpResponse, TrackerError> {
        let max_retries = self.config.max_retries;
        let mut state = RetryState::Attempting {
            retries_left: max_retries,
        };

        loop {
            state = match state {
                RetryState::Attempting { retries_left } => {
                    let result = self.attempt(url).await;
                    RetryState::after_attempt(
                        result,
                        retries_left,
                        self.config.retry_network_errors,
                    )
                }
                RetryState::WaitingRetry {
                    retries_left,
                    cause,
                } => {
                    let attempt = max_retries - retries_left + 1;
                    warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        error = %cause,
                        "Request failed, retrying in {}ms (retry {}/{})",
                        self.config.retry_delay.as_millis(),
                        attempt,
                        max_retries,
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    RetryState::Attempting {
                        retries_left: retries_left - 1,
                    }
                }
                RetryState::Succeeded(response) => return Ok(response),
                RetryState::Failed(cause) => return Err(cause),
            };
        }
    }

    /// One paced, time-limited dispatch. Non-2xx becomes `Http`.
    async fn attempt(&self, url: &str) -> Result<HttpResponse, TrackerError> {
        self.pace().await;

        let timeout = self.config.timeout;
        let response = tokio::time::timeout(timeout, self.transport.get(url))
            .await
            .map_err(|_| TrackerError::Timeout(timeout))??;

        debug!(url = url, status = response.status, "Response received");

        if response.is_success() {
            Ok(response)
        } else {
            Err(TrackerError::Http {
                status: response.status,
                body: response.body,
            })
        }
    }

    /// Sleep until the drawn spacing since the last dispatch has passed,
    /// then record this dispatch.
    ///
    /// The lock is held across the sleep so concurrent callers of the same
    /// fetcher still dispatch one at a time.
    async fn pace(&self) {
        let delay = self.config.draw_delay();
        let mut last = self.last_dispatch.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                let wait = delay - elapsed;
                debug!(delay_ms = wait.as_millis() as u64, "Pacing before next request");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    enum Step {
        Respond(u16, &'static str),
        Hang,
        Drop,
    }

    /// Replays a fixed script of outcomes and records each dispatch.
    struct ScriptedTransport {
        steps: std::sync::Mutex<VecDeque<Step>>,
        dispatches: std::sync::Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: std::sync::Mutex::new(steps.into()),
                dispatches: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.dispatches.lock().unwrap().len()
        }

        fn dispatch_times(&self) -> Vec<Instant> {
            self.dispatches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse, TrackerError> {
            self.dispatches.lock().unwrap().push(Instant::now());
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Respond(200, "{}"));
            match step {
                Step::Respond(status, body) => Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
                Step::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Step::Drop => Err(TrackerError::Network {
                    url: url.to_string(),
                    source: "connection reset by peer".into(),
                }),
            }
        }
    }

    fn no_spacing() -> FetcherConfig {
        FetcherConfig {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..FetcherConfig::default()
        }
    }

    fn fetcher(transport: &Arc<ScriptedTransport>, config: FetcherConfig) -> RateLimitedFetcher {
        RateLimitedFetcher::new(transport.clone(), config)
    }

    // ── Config ──────────────────────────────────────────────────────

    #[test]
    fn test_default_config_matches_upstream_pacing() {
        let config = FetcherConfig::default();
        assert_eq!(config.min_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(4000));
        assert_eq!(config.timeout, Duration::from_millis(15000));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(3000));
        assert!(!config.retry_network_errors);
    }

    #[test]
    fn test_draw_delay_stays_in_window() {
        let config = FetcherConfig::default();
        for _ in 0..200 {
            let d = config.draw_delay();
            assert!(d >= config.min_delay && d <= config.max_delay, "{d:?}");
        }
    }

    #[test]
    fn test_draw_delay_inverted_window_uses_min() {
        let config = FetcherConfig {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(100),
            ..FetcherConfig::default()
        };
        assert_eq!(config.draw_delay(), Duration::from_millis(500));
    }

    // ── State transitions ───────────────────────────────────────────

    #[test]
    fn test_transition_exhausted_budget_fails() {
        let state = RetryState::after_attempt(
            Err(TrackerError::Http {
                status: 500,
                body: String::new(),
            }),
            0,
            false,
        );
        assert!(matches!(
            state,
            RetryState::Failed(TrackerError::Http { status: 500, .. })
        ));
    }

    #[test]
    fn test_transition_retryable_with_budget_waits() {
        let state =
            RetryState::after_attempt(Err(TrackerError::Timeout(Duration::ZERO)), 1, false);
        assert!(matches!(
            state,
            RetryState::WaitingRetry {
                retries_left: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_transition_client_error_fails_immediately() {
        let state = RetryState::after_attempt(
            Err(TrackerError::Http {
                status: 403,
                body: String::new(),
            }),
            5,
            true,
        );
        assert!(matches!(state, RetryState::Failed(_)));
    }

    // ── Pacing ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let transport = ScriptedTransport::new(vec![]);
        let f = fetcher(&transport, FetcherConfig::default());

        let start = Instant::now();
        f.fetch_json("https://example.test/a").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_dispatch_respects_min_delay() {
        let transport = ScriptedTransport::new(vec![]);
        let f = fetcher(&transport, FetcherConfig::default());

        f.fetch_json("https://example.test/a").await.unwrap();
        f.fetch_json("https://example.test/b").await.unwrap();

        let times = transport.dispatch_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] >= times[0] + Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gaps_stay_within_delay_window() {
        let transport = ScriptedTransport::new(vec![]);
        let f = fetcher(&transport, FetcherConfig::default());

        for i in 0..6 {
            f.fetch_json(&format!("https://example.test/{i}"))
                .await
                .unwrap();
        }

        let times = transport.dispatch_times();
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(1000), "gap too short: {gap:?}");
            assert!(gap <= Duration::from_millis(4010), "gap too long: {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_extra_wait_after_idle() {
        let transport = ScriptedTransport::new(vec![]);
        let f = fetcher(&transport, FetcherConfig::default());

        f.fetch_json("https://example.test/a").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let start = Instant::now();
        f.fetch_json("https://example.test/b").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instances_pace_independently() {
        let transport = ScriptedTransport::new(vec![]);
        let a = fetcher(&transport, FetcherConfig::default());
        let b = fetcher(&transport, FetcherConfig::default());

        let start = Instant::now();
        a.fetch_json("https://example.test/a").await.unwrap();
        b.fetch_json("https://example.test/b").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    // ── Retries ─────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_retries_5xx_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Step::Respond(500, "oops"),
            Step::Respond(502, "bad gateway"),
            Step::Respond(200, r#"{"ok":true}"#),
        ]);
        let f = fetcher(&transport, no_spacing());

        let value = f.fetch_json("https://example.test/a").await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_consecutive_500_is_http_error() {
        let transport = ScriptedTransport::new((0..7).map(|_| Step::Respond(500, "down")).collect());
        let f = fetcher(&transport, no_spacing());

        let err = f.fetch_json("https://example.test/a").await.unwrap_err();
        match err {
            TrackerError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "down");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
        // 1 initial + 5 retries
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_retry() {
        let mut steps: Vec<Step> = (0..5).map(|_| Step::Respond(503, "")).collect();
        steps.push(Step::Respond(200, "[]"));
        let transport = ScriptedTransport::new(steps);
        let f = fetcher(&transport, no_spacing());

        let value = f.fetch_json("https://example.test/a").await.unwrap();
        assert!(value.as_array().unwrap().is_empty());
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried_and_keeps_raw_body() {
        let transport = ScriptedTransport::new(vec![Step::Respond(
            404,
            "<html>not found</html>",
        )]);
        let f = fetcher(&transport, no_spacing());

        let err = f.fetch_json("https://example.test/a").await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::Http { status: 404, ref body } if body == "<html>not found</html>"
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let transport = ScriptedTransport::new(vec![Step::Hang, Step::Respond(200, "{}")]);
        let f = fetcher(&transport, no_spacing());

        f.fetch_json("https://example.test/a").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_timeout_fails_with_timeout() {
        let transport = ScriptedTransport::new((0..6).map(|_| Step::Hang).collect());
        let f = fetcher(&transport, no_spacing());

        let err = f.fetch_json("https://example.test/a").await.unwrap_err();
        assert!(matches!(err, TrackerError::Timeout(d) if d == Duration::from_millis(15000)));
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_shared_between_timeouts_and_5xx() {
        let transport = ScriptedTransport::new(vec![
            Step::Hang,
            Step::Respond(500, ""),
            Step::Hang,
            Step::Respond(500, ""),
            Step::Hang,
            Step::Respond(500, "last"),
            Step::Respond(200, "{}"),
        ]);
        let f = fetcher(&transport, no_spacing());

        let err = f.fetch_json("https://example.test/a").await.unwrap_err();
        assert!(matches!(err, TrackerError::Http { status: 500, ref body } if body == "last"));
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_fixed_back_off() {
        let transport = ScriptedTransport::new(vec![
            Step::Respond(500, ""),
            Step::Respond(500, ""),
            Step::Respond(200, "{}"),
        ]);
        let f = fetcher(&transport, no_spacing());

        f.fetch_json("https://example.test/a").await.unwrap();

        let times = transport.dispatch_times();
        let first = times[1] - times[0];
        let second = times[2] - times[1];
        assert!(first >= Duration::from_millis(3000) && first < Duration::from_millis(3100));
        // Fixed, not exponential
        assert!(second >= Duration::from_millis(3000) && second < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_not_retried_by_default() {
        let transport = ScriptedTransport::new(vec![Step::Drop, Step::Respond(200, "{}")]);
        let f = fetcher(&transport, no_spacing());

        let err = f.fetch_json("https://example.test/a").await.unwrap_err();
        assert!(matches!(err, TrackerError::Network { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_retried_when_enabled() {
        let transport = ScriptedTransport::new(vec![Step::Drop, Step::Respond(200, "{}")]);
        let f = fetcher(
            &transport,
            FetcherConfig {
                retry_network_errors: true,
                ..no_spacing()
            },
        );

        f.fetch_json("https://example.test/a").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_json_success_is_malformed() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, "<html>login</html>")]);
        let f = fetcher(&transport, no_spacing());

        let err = f.fetch_json("https://example.test/a").await.unwrap_err();
        assert!(matches!(err, TrackerError::MalformedResponse(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        let transport = ScriptedTransport::new(vec![]);
        let f = Arc::new(fetcher(&transport, FetcherConfig::default()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                f.fetch_json(&format!("https://example.test/{i}")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let mut times = transport.dispatch_times();
        times.sort();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
    }
}
