//! # studyquiz
//!
//! Turn course material (PDFs, photos of notes, slides) into structured study
//! content and exam-style quizzes using the Gemini API.
//!
//! ## Why this crate?
//!
//! Sending a whole textbook in one request is slow, hits output limits and
//! loses everything when a single call fails. This crate extracts the PDF text
//! layer locally, splits it into page segments, and makes one call per
//! segment with retry and backoff. A failed segment is recorded and skipped
//! over; the rest of the document still produces key points.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image
//!  │
//!  ├─ 1. Input     resolve local file or download from URL, sniff kind
//!  ├─ 2. Extract   text layer via pdfium (spawn_blocking)  │ image: downscale + base64
//!  ├─ 3. Segment   group pages, skip near-empty ones
//!  ├─ 4. Call      Gemini generateContent, 5xx/network retried with backoff
//!  ├─ 5. Sanitize  strip ``` fences, repair, parse JSON
//!  └─ 6. Output    DocumentAnalysis → Quiz, recorded in history
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studyquiz::{analyze, generate_quiz_from_analysis, StudyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Key read from GEMINI_API_KEY / STUDYQUIZ_API_KEY / GOOGLE_API_KEY
//!     let config = StudyConfig::builder().question_count(5).build()?;
//!     let analysis = analyze("lecture-03.pdf", &config).await?;
//!     for point in &analysis.key_points {
//!         println!("- {point}");
//!     }
//!     let quiz = generate_quiz_from_analysis(&analysis, &config).await?;
//!     eprintln!("{} questions", quiz.questions.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `studyquiz` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! studyquiz = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_bytes, analyze_image, analyze_pdf, analyze_sync, analyze_to_file,
    generate_quiz, generate_quiz_from_analysis, generate_quiz_with, inspect,
};
pub use config::{Difficulty, PageSelection, QuestionKind, StudyConfig, StudyConfigBuilder};
pub use error::{ApiError, SegmentError, StudyError, TransportError};
pub use history::{EntryKind, HistoryEntry, HistoryFilter, HistoryStore, JsonlHistoryStore};
pub use output::{
    AnalysisStats, Definition, DocumentAnalysis, DocumentMetadata, Question, Quiz, SegmentResult,
    SegmentStatus, StudyContent,
};
pub use pipeline::input::InputKind;
pub use pipeline::transport::{ApiRequest, ApiResponse, HttpTransport, MockTransport, Transport};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{analyze_stream, analyze_stream_from_bytes, stream_segments, SegmentStream};
