//! Batch orchestrator: one model call per page segment, failures isolated.
//!
//! Segments are processed strictly in order, one at a time, with a fixed
//! pause between calls so a 200-page textbook does not trip the API's
//! per-minute quota. Each segment ends in exactly one of three states:
//!
//! ```text
//! too little text ──▶ Skipped   (no call issued)
//! call + parse ok ──▶ Processed (content kept, key points merged)
//! anything else   ──▶ Failed    (logged, recorded, loop continues)
//! ```
//!
//! A partially analysed document is a normal result; deciding whether that
//! is acceptable is left to the caller (see
//! [`crate::output::DocumentAnalysis::into_result`]).

use crate::config::StudyConfig;
use crate::error::{ApiError, SegmentError};
use crate::output::{SegmentResult, SegmentStatus, StudyContent};
use crate::pipeline::gemini::{text_request, GenerationOptions};
use crate::pipeline::llm::request_json;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::segment::PageSegment;
use crate::pipeline::transport::Transport;
use crate::progress::ProgressCallback;
use crate::prompts::pdf_prompt;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Knobs the orchestrator needs, lifted out of [`StudyConfig`].
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub model: String,
    pub prompt: String,
    pub options: GenerationOptions,
    pub policy: RetryPolicy,
    pub min_segment_chars: usize,
    pub inter_request_delay: Duration,
}

impl BatchSettings {
    pub fn from_config(config: &StudyConfig) -> Self {
        Self {
            model: config.model.clone(),
            prompt: pdf_prompt(config.analysis_prompt.as_deref()),
            options: GenerationOptions::from_config(config),
            policy: RetryPolicy::from_config(config),
            min_segment_chars: config.min_segment_chars,
            inter_request_delay: Duration::from_millis(config.inter_request_delay_ms),
        }
    }
}

/// Process every segment in order and return one result per segment.
pub async fn run_batch(
    transport: &dyn Transport,
    segments: &[PageSegment],
    config: &StudyConfig,
) -> Vec<SegmentResult> {
    let mut runner = SegmentRunner::new(config, segments.len());
    runner.start();

    let mut results = Vec::with_capacity(segments.len());
    for segment in segments {
        results.push(runner.run(transport, segment).await);
    }

    let processed = results.iter().filter(|r| r.is_processed()).count();
    info!(
        "Batch complete: {} processed, {} failed, {} skipped",
        processed,
        results.iter().filter(|r| r.error().is_some()).count(),
        results.iter().filter(|r| r.is_skipped()).count()
    );
    runner.finish(processed);

    results
}

/// Skip-or-send state for one pass over a document's segments.
///
/// Shared by [`run_batch`] and [`crate::stream::stream_segments`] so both
/// apply the same skip rule, pause only between issued calls, and report
/// the same progress events.
pub(crate) struct SegmentRunner {
    settings: BatchSettings,
    progress: Option<ProgressCallback>,
    total: usize,
    calls_issued: usize,
}

impl SegmentRunner {
    pub(crate) fn new(config: &StudyConfig, total: usize) -> Self {
        Self {
            settings: BatchSettings::from_config(config),
            progress: config.progress_callback.clone(),
            total,
            calls_issued: 0,
        }
    }

    pub(crate) fn start(&self) {
        info!("Analysing {} segments", self.total);
        if let Some(cb) = &self.progress {
            cb.on_analysis_start(self.total);
        }
    }

    /// Skip `segment` if it is too short, otherwise send it.
    pub(crate) async fn run(
        &mut self,
        transport: &dyn Transport,
        segment: &PageSegment,
    ) -> SegmentResult {
        let total = self.total;
        let chars = segment.content_len();
        if chars < self.settings.min_segment_chars {
            debug!(
                "Segment {} (pages {}): {} chars, skipped",
                segment.index,
                segment.page_label(),
                chars
            );
            if let Some(cb) = &self.progress {
                cb.on_segment_skipped(segment.index, total, chars);
            }
            return skipped(segment, chars);
        }

        if self.calls_issued > 0 && !self.settings.inter_request_delay.is_zero() {
            sleep(self.settings.inter_request_delay).await;
        }
        self.calls_issued += 1;

        if let Some(cb) = &self.progress {
            cb.on_segment_start(segment.index, total);
        }

        let result = process_segment(transport, segment, &self.settings).await;

        if let Some(cb) = &self.progress {
            match (&result.status, &result.content) {
                (SegmentStatus::Failed { error }, _) => {
                    cb.on_segment_error(segment.index, total, error.to_string())
                }
                (_, Some(content)) => {
                    cb.on_segment_complete(segment.index, total, content.key_points.len())
                }
                _ => {}
            }
        }
        result
    }

    pub(crate) fn finish(&self, processed: usize) {
        if let Some(cb) = &self.progress {
            cb.on_analysis_complete(self.total, processed);
        }
    }
}

/// Send one segment. Never returns an error: failures become `SegmentStatus::Failed`.
pub async fn process_segment(
    transport: &dyn Transport,
    segment: &PageSegment,
    settings: &BatchSettings,
) -> SegmentResult {
    let start = Instant::now();
    let content = format!(
        "DOCUMENT PAGES {}:\n\n{}",
        segment.page_label(),
        segment.text.trim()
    );
    let request = text_request(&settings.model, &settings.prompt, &content, settings.options);

    match request_json::<StudyContent>(transport, &request, &settings.policy).await {
        Ok((content, stats)) => SegmentResult {
            index: segment.index,
            first_page: segment.first_page,
            last_page: segment.last_page,
            status: SegmentStatus::Processed,
            content: Some(content),
            input_tokens: stats.input_tokens,
            output_tokens: stats.output_tokens,
            duration_ms: stats.duration_ms,
            retries: stats.retries,
        },
        Err(e) => {
            warn!(
                "Segment {} (pages {}) failed, continuing: {}",
                segment.index,
                segment.page_label(),
                e
            );
            let retries = e.retries;
            SegmentResult {
                index: segment.index,
                first_page: segment.first_page,
                last_page: segment.last_page,
                status: SegmentStatus::Failed {
                    error: segment_error(segment, retries, e.error),
                },
                content: None,
                input_tokens: 0,
                output_tokens: 0,
                duration_ms: start.elapsed().as_millis() as u64,
                retries,
            }
        }
    }
}

fn segment_error(segment: &PageSegment, retries: u32, e: ApiError) -> SegmentError {
    match e {
        ApiError::MalformedResponse { reason, .. } => SegmentError::MalformedResponse {
            segment: segment.index,
            pages: segment.page_label(),
            detail: reason,
        },
        other => SegmentError::RequestFailed {
            segment: segment.index,
            pages: segment.page_label(),
            retries,
            detail: other.to_string(),
        },
    }
}

fn skipped(segment: &PageSegment, chars: usize) -> SegmentResult {
    SegmentResult {
        index: segment.index,
        first_page: segment.first_page,
        last_page: segment.last_page,
        status: SegmentStatus::Skipped { chars },
        content: None,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        retries: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::gemini::reply_envelope;
    use crate::pipeline::transport::{ApiResponse, MockTransport};

    fn segment(index: usize, text: &str) -> PageSegment {
        PageSegment::new(index, index, index, text)
    }

    fn config() -> StudyConfig {
        StudyConfig::builder()
            .max_retries(1)
            .retry_backoff_ms(1)
            .max_backoff_ms(1)
            .inter_request_delay_ms(0)
            .min_segment_chars(10)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn short_segments_are_skipped_without_a_call() {
        let mock = MockTransport::from_fn(|_, _| {
            Ok(ApiResponse::new(200, reply_envelope(r#"{"summary":"s","key_points":["k"]}"#)))
        });
        let segs = vec![segment(1, "   tiny   "), segment(2, "long enough text here")];
        let results = run_batch(&mock, &segs, &config()).await;
        assert!(results[0].is_skipped());
        assert!(results[1].is_processed());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_segment_is_recorded_as_such() {
        let mock = MockTransport::from_fn(|_, _| Ok(ApiResponse::new(200, reply_envelope("{oops"))));
        let results = run_batch(&mock, &[segment(1, "some page text long enough")], &config()).await;
        assert!(matches!(
            results[0].error(),
            Some(SegmentError::MalformedResponse { segment: 1, .. })
        ));
    }

    #[tokio::test]
    async fn exhausted_segment_reports_retries() {
        let mock = MockTransport::from_fn(|_, _| Ok(ApiResponse::new(500, "down")));
        let results = run_batch(&mock, &[segment(1, "some page text long enough")], &config()).await;
        assert_eq!(results[0].retries, 1);
        assert!(matches!(
            results[0].error(),
            Some(SegmentError::RequestFailed { retries: 1, .. })
        ));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn client_error_after_server_errors_records_real_retries() {
        let mock = MockTransport::scripted(vec![
            Ok(ApiResponse::new(500, "down")),
            Ok(ApiResponse::new(500, "down")),
            Ok(ApiResponse::new(404, "model not found")),
        ]);
        let cfg = StudyConfig::builder()
            .max_retries(3)
            .retry_backoff_ms(1)
            .max_backoff_ms(1)
            .inter_request_delay_ms(0)
            .min_segment_chars(10)
            .build()
            .unwrap();
        let results = run_batch(&mock, &[segment(1, "some page text long enough")], &cfg).await;
        assert_eq!(mock.calls(), 3);
        assert_eq!(results[0].retries, 2);
        assert!(matches!(
            results[0].error(),
            Some(SegmentError::RequestFailed { retries: 2, .. })
        ));
    }

    #[tokio::test]
    async fn blank_multi_page_segment_is_skipped() {
        use crate::pipeline::extract::PageText;
        use crate::pipeline::segment::segment_pages;

        let pages: Vec<PageText> = (1..=4)
            .map(|n| PageText {
                page_num: n,
                text: "   ".into(),
            })
            .collect();
        let segs = segment_pages(&pages, 4, 10_000);
        assert_eq!(segs.len(), 1);

        let mock = MockTransport::scripted(vec![]);
        let results = run_batch(&mock, &segs, &config()).await;
        assert!(matches!(results[0].status, SegmentStatus::Skipped { chars: 0 }));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn request_includes_page_label() {
        let mock = MockTransport::from_fn(|_, _| {
            Ok(ApiResponse::new(200, reply_envelope(r#"{"summary":"s"}"#)))
        });
        let seg = PageSegment::new(1, 3, 4, "text that is long enough");
        run_batch(&mock, &[seg], &config()).await;
        let body = &mock.requests()[0].body;
        let content = body["contents"][0]["parts"][1]["text"].as_str().unwrap();
        assert!(content.starts_with("DOCUMENT PAGES 3-4"));
    }
}
