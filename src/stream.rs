//! Streaming analysis API: emit segment results as they complete.
//!
//! A 300-page textbook takes minutes at one call per segment. The stream
//! lets callers show partial results, drive a progress bar, or persist each
//! segment as it lands instead of waiting for [`crate::analyze::analyze`].
//!
//! Segments are still processed one at a time with the configured pause
//! between calls, so items arrive in page order.

use crate::analyze::resolve_transport;
use crate::config::StudyConfig;
use crate::error::StudyError;
use crate::output::SegmentResult;
use crate::pipeline::batch::SegmentRunner;
use crate::pipeline::input::{self, InputKind, ResolvedInput};
use crate::pipeline::segment::PageSegment;
use crate::pipeline::transport::Transport;
use crate::pipeline::{extract, segment};
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of segment results, in page order.
pub type SegmentStream = Pin<Box<dyn Stream<Item = SegmentResult> + Send>>;

/// Analyse a PDF, streaming one [`SegmentResult`] per segment.
///
/// # Returns
/// - `Ok(SegmentStream)`: every segment, including skipped and failed ones
/// - `Err(StudyError)`: fatal error before any call (not a PDF, no API key, ...)
///
/// # Example
/// ```rust,no_run
/// use studyquiz::{analyze_stream, StudyConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = StudyConfig::default();
/// let mut stream = analyze_stream("lecture.pdf", &config).await?;
/// while let Some(seg) = stream.next().await {
///     match seg.error() {
///         None => println!("pages {}-{}: ok", seg.first_page, seg.last_page),
///         Some(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn analyze_stream(
    input_str: impl AsRef<str>,
    config: &StudyConfig,
) -> Result<SegmentStream, StudyError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming analysis: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    stream_resolved(resolved, config).await
}

/// Streaming equivalent of [`crate::analyze::analyze_bytes`] for PDFs.
pub async fn analyze_stream_from_bytes(
    bytes: &[u8],
    source_name: &str,
    config: &StudyConfig,
) -> Result<SegmentStream, StudyError> {
    let resolved = input::resolve_bytes(bytes, source_name)?;
    stream_resolved(resolved, config).await
}

async fn stream_resolved(
    resolved: ResolvedInput,
    config: &StudyConfig,
) -> Result<SegmentStream, StudyError> {
    if resolved.kind() != InputKind::Pdf {
        return Err(StudyError::InvalidRequest(format!(
            "{} is an image; streaming applies to PDFs only",
            resolved.source_name()
        )));
    }

    let transport = resolve_transport(config)?;

    // Text is extracted up front; the temp file can go once we hold it.
    let pages =
        extract::extract_pages(resolved.path(), config.password.as_deref(), &config.pages).await?;
    drop(resolved);
    let segments =
        segment::segment_pages(&pages, config.pages_per_segment, config.max_segment_chars);

    Ok(stream_segments(transport, segments, config))
}

/// Stream one [`SegmentResult`] per segment, in order.
///
/// Skip rule, pause between calls and progress events are the same as
/// [`crate::pipeline::batch::run_batch`]; nothing is sent until the stream
/// is polled.
pub fn stream_segments(
    transport: Arc<dyn Transport>,
    segments: Vec<PageSegment>,
    config: &StudyConfig,
) -> SegmentStream {
    let runner = SegmentRunner::new(config, segments.len());
    runner.start();

    let state = (runner, transport, segments.into_iter(), 0usize);
    let s = stream::unfold(state, |(mut runner, transport, mut segments, mut processed)| async move {
        match segments.next() {
            Some(seg) => {
                let result = runner.run(transport.as_ref(), &seg).await;
                if result.is_processed() {
                    processed += 1;
                }
                Some((result, (runner, transport, segments, processed)))
            }
            None => {
                runner.finish(processed);
                None
            }
        }
    });

    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentError;
    use crate::pipeline::gemini::reply_envelope;
    use crate::pipeline::transport::{ApiResponse, MockTransport};
    use crate::progress::AnalysisProgressCallback;
    use futures::StreamExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn push(&self, event: String) {
            self.0.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AnalysisProgressCallback for Recorder {
        fn on_analysis_start(&self, total: usize) {
            self.push(format!("start {total}"));
        }
        fn on_segment_start(&self, segment: usize, _total: usize) {
            self.push(format!("send {segment}"));
        }
        fn on_segment_complete(&self, segment: usize, _total: usize, _key_points: usize) {
            self.push(format!("done {segment}"));
        }
        fn on_segment_skipped(&self, segment: usize, _total: usize, _chars: usize) {
            self.push(format!("skip {segment}"));
        }
        fn on_segment_error(&self, segment: usize, _total: usize, _error: String) {
            self.push(format!("fail {segment}"));
        }
        fn on_analysis_complete(&self, total: usize, processed: usize) {
            self.push(format!("complete {processed}/{total}"));
        }
    }

    const PAGE: &str = "Mitochondria produce ATP through oxidative phosphorylation.";

    #[tokio::test]
    async fn streams_in_order_and_continues_past_failures() {
        let mock = Arc::new(MockTransport::from_fn(|req, _| {
            let text = req.body["contents"][0]["parts"][1]["text"]
                .as_str()
                .unwrap_or_default();
            if text.starts_with("DOCUMENT PAGES 3:") {
                Ok(ApiResponse::new(400, "bad request"))
            } else {
                Ok(ApiResponse::new(200, reply_envelope(r#"{"summary":"s","key_points":["k"]}"#)))
            }
        }));
        let recorder = Arc::new(Recorder::default());
        let config = StudyConfig::builder()
            .retry_backoff_ms(1)
            .max_backoff_ms(1)
            .inter_request_delay_ms(0)
            .min_segment_chars(10)
            .progress_callback(Arc::clone(&recorder) as Arc<dyn AnalysisProgressCallback>)
            .build()
            .unwrap();
        let segments = vec![
            PageSegment::new(1, 1, 1, PAGE),
            PageSegment::new(2, 2, 2, "  tiny  "),
            PageSegment::new(3, 3, 3, PAGE),
            PageSegment::new(4, 4, 4, PAGE),
        ];

        let results: Vec<SegmentResult> =
            stream_segments(Arc::clone(&mock) as Arc<dyn Transport>, segments, &config)
                .collect()
                .await;

        assert_eq!(
            results.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert!(results[0].is_processed());
        assert!(results[1].is_skipped());
        assert!(matches!(
            results[2].error(),
            Some(SegmentError::RequestFailed { segment: 3, retries: 0, .. })
        ));
        assert!(results[3].is_processed());
        assert_eq!(mock.calls(), 3);

        assert_eq!(
            recorder.events(),
            vec![
                "start 4", "send 1", "done 1", "skip 2", "send 3", "fail 3", "send 4", "done 4",
                "complete 2/4",
            ]
        );
    }

    #[tokio::test]
    async fn nothing_is_sent_until_polled() {
        let mock = Arc::new(MockTransport::scripted(vec![]));
        let config = StudyConfig::builder().inter_request_delay_ms(0).build().unwrap();
        let stream = stream_segments(
            Arc::clone(&mock) as Arc<dyn Transport>,
            vec![PageSegment::new(1, 1, 1, PAGE)],
            &config,
        );
        drop(stream);
        assert_eq!(mock.calls(), 0);
    }
}
