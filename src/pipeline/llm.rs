//! One model call, end to end: retry, unwrap the envelope, parse the JSON.
//!
//! Every higher-level operation (image analysis, a PDF segment, quiz
//! generation) is this function with a different prompt and target type.

use crate::pipeline::gemini::extract_reply;
use crate::pipeline::retry::{send_counting_retries, FailedCall, RetryPolicy};
use crate::pipeline::sanitize::parse_json;
use crate::pipeline::transport::{ApiRequest, Transport};
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::debug;

/// Bookkeeping for one successful call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Send `request` and parse the model's JSON reply into `T`.
///
/// A failure carries the retries that preceded it, including when the
/// reply that finally arrived could not be parsed.
pub async fn request_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    request: &ApiRequest,
    policy: &RetryPolicy,
) -> Result<(T, CallStats), FailedCall> {
    let start = Instant::now();
    let outcome = send_counting_retries(transport, request, policy).await?;
    let retries = outcome.retries;
    let reply = extract_reply(&outcome.response.body).map_err(|e| FailedCall::new(e, retries))?;
    let value = parse_json::<T>(&reply.text).map_err(|e| FailedCall::new(e, retries))?;

    let stats = CallStats {
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
        retries,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    debug!(
        "{}: {} input tokens, {} output tokens, {} retries, {}ms",
        request.model, stats.input_tokens, stats.output_tokens, stats.retries, stats.duration_ms
    );

    Ok((value, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::output::StudyContent;
    use crate::pipeline::gemini::reply_envelope;
    use crate::pipeline::transport::{ApiResponse, MockTransport};
    use serde_json::json;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    fn request() -> ApiRequest {
        ApiRequest {
            model: "m".into(),
            body: json!({}),
        }
    }

    #[tokio::test]
    async fn parses_fenced_reply() {
        let text = "```json\n{\"summary\": \"Photosynthesis\", \"key_points\": [\"light reactions\"]}\n```";
        let mock = MockTransport::scripted(vec![
            Ok(ApiResponse::new(502, "bad gateway")),
            Ok(ApiResponse::new(200, reply_envelope(text))),
        ]);
        let (content, stats): (StudyContent, _) =
            request_json(&mock, &request(), &policy()).await.unwrap();
        assert_eq!(content.summary, "Photosynthesis");
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.input_tokens, 100);
    }

    #[tokio::test]
    async fn malformed_reply_is_not_retried() {
        let mock = MockTransport::scripted(vec![Ok(ApiResponse::new(
            200,
            reply_envelope("not json at all"),
        ))]);
        let err = request_json::<StudyContent>(&mock, &request(), &policy())
            .await
            .unwrap_err();
        assert!(matches!(err.error, ApiError::MalformedResponse { .. }));
        assert_eq!(err.retries, 0);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_after_retries_reports_them() {
        let mock = MockTransport::scripted(vec![
            Ok(ApiResponse::new(500, "boom")),
            Ok(ApiResponse::new(503, "busy")),
            Ok(ApiResponse::new(200, reply_envelope("still not json"))),
        ]);
        let err = request_json::<StudyContent>(&mock, &request(), &policy())
            .await
            .unwrap_err();
        assert!(matches!(err.error, ApiError::MalformedResponse { .. }));
        assert_eq!(err.retries, 2);
        assert_eq!(mock.calls(), 3);
    }
}
