//! Progress-callback trait for per-segment analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::StudyConfigBuilder::progress_callback`] to receive events
//! as the batch orchestrator walks the document. Callers can forward them to a
//! terminal progress bar, a channel or a log without the library knowing how
//! the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use studyquiz::{AnalysisProgressCallback, StudyConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl AnalysisProgressCallback for Counter {
//!     fn on_segment_complete(&self, segment: usize, total: usize, key_points: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("segment {segment}/{total}: {key_points} key points");
//!     }
//! }
//!
//! let config = StudyConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it processes each segment.
///
/// Segments are processed sequentially, but the trait is `Send + Sync` so the
/// whole analysis can run inside `tokio::spawn`. All methods have no-op
/// defaults.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once before the first segment.
    fn on_analysis_start(&self, total_segments: usize) {
        let _ = total_segments;
    }

    /// Called just before the request for a segment is sent.
    ///
    /// `segment` is 1-indexed.
    fn on_segment_start(&self, segment: usize, total_segments: usize) {
        let _ = (segment, total_segments);
    }

    /// Called when a segment was analysed successfully.
    fn on_segment_complete(&self, segment: usize, total_segments: usize, key_points: usize) {
        let _ = (segment, total_segments, key_points);
    }

    /// Called when a segment is below the minimum text length and not sent.
    fn on_segment_skipped(&self, segment: usize, total_segments: usize, chars: usize) {
        let _ = (segment, total_segments, chars);
    }

    /// Called when a segment failed; the batch continues.
    fn on_segment_error(&self, segment: usize, total_segments: usize, error: String) {
        let _ = (segment, total_segments, error);
    }

    /// Called once after every segment has been attempted.
    fn on_analysis_complete(&self, total_segments: usize, processed: usize) {
        let _ = (total_segments, processed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::StudyConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
