//! Retry wrapper around a single [`Transport`] call.
//!
//! ## Retry Strategy
//!
//! | Outcome | Action |
//! |---------|--------|
//! | 2xx | return immediately |
//! | 5xx | sleep, double the delay, retry |
//! | network failure | sleep, double the delay, retry |
//! | 4xx | fail immediately with [`ApiError::Client`] |
//!
//! The delay before retry `n` (1-based) is `initial_backoff_ms * 2^(n-1)`,
//! capped at `max_backoff_ms`: with the defaults 1 s → 2 s → 4 s. When every
//! attempt fails the caller receives [`ApiError::RetriesExhausted`], which
//! names the last underlying cause but is never confused with it.

use crate::config::StudyConfig;
use crate::error::{ApiError, StudyError};
use crate::pipeline::transport::{ApiRequest, ApiResponse, Transport};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 16_000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &StudyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.retry_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }

    /// Wait before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// A successful response together with how many retries it took.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub response: ApiResponse,
    pub retries: u32,
}

/// A failed call together with the retries spent on it before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCall {
    pub error: ApiError,
    pub retries: u32,
}

impl FailedCall {
    pub fn new(error: ApiError, retries: u32) -> Self {
        Self { error, retries }
    }
}

impl std::fmt::Display for FailedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl From<FailedCall> for ApiError {
    fn from(failed: FailedCall) -> Self {
        failed.error
    }
}

impl From<FailedCall> for StudyError {
    fn from(failed: FailedCall) -> Self {
        StudyError::Api(failed.error)
    }
}

/// Send `request`, retrying transient failures according to `policy`.
pub async fn send_with_retry(
    transport: &dyn Transport,
    request: &ApiRequest,
    policy: &RetryPolicy,
) -> Result<RetryOutcome, ApiError> {
    send_counting_retries(transport, request, policy)
        .await
        .map_err(ApiError::from)
}

/// Like [`send_with_retry`], but a failure still reports how many retries
/// were made before it.
pub async fn send_counting_retries(
    transport: &dyn Transport,
    request: &ApiRequest,
    policy: &RetryPolicy,
) -> Result<RetryOutcome, FailedCall> {
    let mut last_err: Option<ApiError> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let wait = policy.backoff(attempt);
            warn!(
                "retry {}/{} after {}ms",
                attempt,
                policy.max_retries,
                wait.as_millis()
            );
            sleep(wait).await;
        }

        let err = match transport.send(request).await {
            Ok(response) if response.is_success() => {
                debug!("HTTP {} after {} retries", response.status, attempt);
                return Ok(RetryOutcome {
                    response,
                    retries: attempt,
                });
            }
            Ok(response) => ApiError::from_response(response),
            Err(e) => ApiError::Network(e),
        };

        if !err.is_retryable() {
            warn!("HTTP {:?} is not retryable", err.status());
            return Err(FailedCall::new(err, attempt));
        }

        warn!("attempt {} failed: {}", attempt + 1, err);
        last_err = Some(err);
    }

    let exhausted = ApiError::RetriesExhausted {
        attempts: policy.max_retries + 1,
        last_error: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    };
    Err(FailedCall::new(exhausted, policy.max_retries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::pipeline::transport::MockTransport;
    use serde_json::json;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    fn request() -> ApiRequest {
        ApiRequest {
            model: "test-model".into(),
            body: json!({"contents": []}),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 6,
            initial_backoff_ms: 500,
            max_backoff_ms: 3000,
        };
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(1000));
        assert_eq!(p.backoff(3), Duration::from_millis(2000));
        assert_eq!(p.backoff(4), Duration::from_millis(3000));
        assert_eq!(p.backoff(60), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn three_server_errors_then_success() {
        let mock = MockTransport::scripted(vec![
            Ok(ApiResponse::new(500, "a")),
            Ok(ApiResponse::new(500, "b")),
            Ok(ApiResponse::new(500, "c")),
            Ok(ApiResponse::new(200, "done")),
        ]);
        let out = send_with_retry(&mock, &request(), &fast_policy(3))
            .await
            .expect("fourth attempt succeeds");
        assert_eq!(out.retries, 3);
        assert_eq!(out.response.body, "done");
        assert_eq!(mock.calls(), 4);
    }

    #[tokio::test]
    async fn client_error_fails_without_retry() {
        let mock = MockTransport::scripted(vec![
            Ok(ApiResponse::new(404, "no such model")),
            Ok(ApiResponse::new(200, "never reached")),
        ]);
        let err = send_with_retry(&mock, &request(), &fast_policy(3))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Client {
                status: 404,
                body: "no such model".into()
            }
        );
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn network_errors_are_retried() {
        let mock = MockTransport::scripted(vec![
            Err(TransportError::Timeout { secs: 1 }),
            Err(TransportError::Connect("reset".into())),
            Ok(ApiResponse::new(200, "ok")),
        ]);
        let out = send_with_retry(&mock, &request(), &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(out.retries, 2);
    }

    #[tokio::test]
    async fn exhaustion_is_its_own_error() {
        let mock = MockTransport::from_fn(|_, _| Ok(ApiResponse::new(503, "overloaded")));
        let err = send_with_retry(&mock, &request(), &fast_policy(2))
            .await
            .unwrap_err();
        match err {
            ApiError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("503"), "got: {last_error}");
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(mock.calls(), 3);
    }

    #[test]
    fn zero_retries_means_one_attempt() {
        let mock = MockTransport::from_fn(|_, _| Ok(ApiResponse::new(500, "x")));
        let err = tokio_test::block_on(send_with_retry(&mock, &request(), &fast_policy(0)))
            .unwrap_err();
        assert!(matches!(err, ApiError::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn client_error_after_retries_keeps_the_retry_count() {
        let mock = MockTransport::scripted(vec![
            Ok(ApiResponse::new(500, "a")),
            Ok(ApiResponse::new(500, "b")),
            Ok(ApiResponse::new(404, "gone")),
        ]);
        let failed = send_counting_retries(&mock, &request(), &fast_policy(3))
            .await
            .unwrap_err();
        assert_eq!(failed.retries, 2);
        assert!(matches!(failed.error, ApiError::Client { status: 404, .. }));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn redirect_status_is_not_retried() {
        let mock = MockTransport::scripted(vec![Ok(ApiResponse::new(302, "moved"))]);
        let failed = send_counting_retries(&mock, &request(), &fast_policy(3))
            .await
            .unwrap_err();
        assert_eq!(failed.retries, 0);
        assert_eq!(failed.error.status(), Some(302));
        assert_eq!(mock.calls(), 1);
    }
}
