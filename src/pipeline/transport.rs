//! The HTTP seam between the pipeline and the model API.
//!
//! A [`Transport`] performs exactly one request and reports what happened:
//! any HTTP status comes back as `Ok(ApiResponse)`, and only failures that
//! never produced a response (DNS, connect, timeout, body read) are
//! `Err(TransportError)`. Deciding what a status *means* is the retry
//! wrapper's job ([`crate::pipeline::retry`]), which keeps transports trivial
//! to fake.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// One `generateContent` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Model identifier, e.g. `gemini-2.0-flash`.
    pub model: String,
    /// JSON request body.
    pub body: Value,
}

/// Raw HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Sends a single request to the model API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

// ── reqwest implementation ───────────────────────────────────────────────

/// Posts requests to `{base_url}/models/{model}:generateContent`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.endpoint(&request.model);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        debug!("HTTP {} ({} bytes)", status, body.len());

        Ok(ApiResponse { status, body })
    }
}

impl HttpTransport {
    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

// ── Mock implementation ──────────────────────────────────────────────────

type Handler = dyn Fn(&ApiRequest, usize) -> Result<ApiResponse, TransportError> + Send + Sync;

/// A deterministic in-memory transport.
///
/// Either replays a script of replies in order, or answers every request
/// through a handler that receives the request and the 0-based call number.
/// Every request is recorded for later inspection.
///
/// ```rust
/// use studyquiz::pipeline::transport::{ApiResponse, MockTransport};
///
/// let mock = MockTransport::scripted(vec![
///     Ok(ApiResponse::new(500, "busy")),
///     Ok(ApiResponse::new(200, "{}")),
/// ]);
/// assert_eq!(mock.calls(), 0);
/// ```
pub struct MockTransport {
    script: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    handler: Option<Box<Handler>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    /// Replay `replies` in order; once exhausted every call gets HTTP 500.
    pub fn scripted(replies: Vec<Result<ApiResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            handler: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer each request with `handler(request, call_index)`.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest, usize) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(handler)),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of `send` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }

        if let Some(ref handler) = self.handler {
            return handler(request, n);
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(ApiResponse::new(500, "mock script exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ApiRequest {
        ApiRequest {
            model: "m".into(),
            body: json!({}),
        }
    }

    #[test]
    fn status_classes() {
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(404, "").is_server_error());
        assert!(ApiResponse::new(503, "").is_server_error());
        assert!(!ApiResponse::new(302, "").is_success());
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let t = HttpTransport::new("https://example.test/v1beta/", "k", 5).unwrap();
        assert_eq!(
            t.endpoint("gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn scripted_mock_replays_in_order_then_fails() {
        let mock = MockTransport::scripted(vec![
            Err(TransportError::Connect("refused".into())),
            Ok(ApiResponse::new(200, "ok")),
        ]);
        assert!(mock.send(&request()).await.is_err());
        assert_eq!(mock.send(&request()).await.unwrap().body, "ok");
        assert_eq!(mock.send(&request()).await.unwrap().status, 500);
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn handler_mock_sees_call_index() {
        let mock = MockTransport::from_fn(|_, n| Ok(ApiResponse::new(200, n.to_string())));
        assert_eq!(mock.send(&request()).await.unwrap().body, "0");
        assert_eq!(mock.send(&request()).await.unwrap().body, "1");
    }
}
