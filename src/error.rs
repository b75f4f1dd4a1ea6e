// Error taxonomy for the polling client and the history store.
//
// Every layer adds its own one-line context with anyhow, so a failure
// reads as a chain ("Refresh failed: Failed to fetch followers: HTTP 403").
// The typed TrackerError sits at the root of that chain and can be
// recovered with `find_tracker_error` when a caller needs to branch on it.

use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// No session identity available (missing `ds_user_id` cookie).
    #[error("no session identity found: {0}")]
    Auth(String),

    /// A 2xx response that lacks a required field or is inconsistent.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Non-retryable HTTP failure, or retry budget exhausted.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("network error requesting {url}")]
    Network {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("storage error during {operation}")]
    Storage {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl TrackerError {
    pub fn malformed(message: impl Into<String>) -> Self {
        TrackerError::MalformedResponse(message.into())
    }

    /// Whether the fetcher's retry loop may try this request again.
    ///
    /// Timeouts and 5xx responses always qualify. Network failures only
    /// qualify when `retry_network` is set.
    pub fn is_retryable(&self, retry_network: bool) -> bool {
        match self {
            TrackerError::Timeout(_) => true,
            TrackerError::Http { status, .. } => *status >= 500,
            TrackerError::Network { .. } => retry_network,
            _ => false,
        }
    }
}

/// Walk an anyhow chain and return the first TrackerError in it.
pub fn find_tracker_error(err: &anyhow::Error) -> Option<&TrackerError> {
    err.chain().find_map(|e| e.downcast_ref::<TrackerError>())
}

/// Build a `map_err` adapter that wraps a store failure as `Storage`.
pub(crate) fn storage(operation: &'static str) -> impl FnOnce(anyhow::Error) -> anyhow::Error {
    move |source| {
        TrackerError::Storage {
            operation,
            source: source.into(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_retryable_classification() {
        assert!(TrackerError::Timeout(Duration::from_secs(15)).is_retryable(false));
        assert!(TrackerError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable(false));
        assert!(!TrackerError::Http {
            status: 404,
            body: String::new()
        }
        .is_retryable(true));
        assert!(!TrackerError::malformed("missing users").is_retryable(true));

        let network = || TrackerError::Network {
            url: "https://example.test".to_string(),
            source: "connection reset".into(),
        };
        assert!(!network().is_retryable(false));
        assert!(network().is_retryable(true));
    }

    #[test]
    fn test_find_tracker_error_through_context() {
        let result: anyhow::Result<()> = Err(TrackerError::Http {
            status: 429,
            body: "slow down".to_string(),
        })
        .context("Failed to fetch page")
        .context("Refresh failed");

        let err = result.unwrap_err();
        match find_tracker_error(&err) {
            Some(TrackerError::Http { status, body }) => {
                assert_eq!(*status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
        let full = format!("{err:#}");
        assert!(full.starts_with("Refresh failed: Failed to fetch page: HTTP 429"));
    }

    #[test]
    fn test_storage_wrapper_keeps_cause() {
        let err = storage("save_following")(anyhow::anyhow!("disk full"));
        assert!(matches!(
            find_tracker_error(&err),
            Some(TrackerError::Storage {
                operation: "save_following",
                ..
            })
        ));
        assert!(format!("{err:#}").contains("disk full"));
    }
}
