//! Error types for the studyquiz library.
//!
//! Three layers reflect three distinct failure scopes:
//!
//! * [`StudyError`]: **Fatal**: the operation cannot proceed at all (bad
//!   input file, no API key, every segment failed). Returned as
//!   `Err(StudyError)` from the top-level `analyze*` / `generate_quiz`
//!   functions.
//!
//! * [`ApiError`]: a single request to the model API failed: the server
//!   rejected it, retries ran out, or the reply could not be parsed. It is
//!   fatal for single-call operations (image analysis, quiz generation) and
//!   downgraded to a [`SegmentError`] inside the batch orchestrator.
//!
//! * [`SegmentError`]: **Non-fatal**: one page segment failed but the rest
//!   of the document is fine. Stored inside [`crate::output::SegmentResult`]
//!   so callers can inspect partial success.

use crate::pipeline::transport::ApiResponse;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the studyquiz library.
#[derive(Debug, Error)]
pub enum StudyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The input is readable but not usable for the requested operation
    /// (an image passed where a PDF is needed, empty quiz text, unknown id).
    #[error("{0}")]
    InvalidRequest(String),

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input is neither a PDF nor a supported image.
    #[error("Unsupported file '{source_name}': expected a PDF, PNG or JPEG\nFirst bytes: {magic:?}")]
    UnsupportedFormat { source_name: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium could not read the text layer of a page.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Image errors ──────────────────────────────────────────────────────
    /// The image bytes could not be decoded or re-encoded.
    #[error("Image '{source_name}' could not be processed: {detail}")]
    ImageFailed { source_name: String, detail: String },

    // ── API errors ────────────────────────────────────────────────────────
    /// No transport could be built (missing API key etc.).
    #[error("Model API is not configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    /// A single-call operation failed at the API layer.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Every segment that was sent to the model failed.
    #[error("All {total} segments failed after {retries} retries each.\nFirst error: {first_error}")]
    AllSegmentsFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    /// Every segment was below the minimum text length; nothing to send.
    #[error("No extractable text in '{source_name}' ({skipped} segments below {min_chars} chars).\nScanned PDFs need OCR; try exporting pages as images.")]
    NoExtractableText {
        source_name: String,
        skipped: usize,
        min_chars: usize,
    },

    /// Some segments succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::DocumentAnalysis::into_result`] when the
    /// caller wants to treat any segment failure as an error.
    #[error("{failed}/{total} segments failed during analysis")]
    PartialFailure {
        processed: usize,
        failed: usize,
        total: usize,
    },

    /// The model returned a quiz but none of its questions were usable.
    #[error("The model returned {returned} questions, none of them valid")]
    NoValidQuestions { returned: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The history file could not be read or written.
    #[error("History store '{path}': {detail}")]
    History { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed request to the model API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// 4xx: the request itself is wrong (bad key, bad body, quota). Never retried.
    #[error("API rejected the request with HTTP {status}: {body}")]
    Client { status: u16, body: String },

    /// 5xx: the server failed. Retried with backoff.
    #[error("API server error HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// The request never produced an HTTP response. Retried with backoff.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts; last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The reply arrived but is not the JSON we asked for.
    #[error("malformed model response ({reason}): {}", preview(.raw))]
    MalformedResponse { reason: String, raw: String },
}

impl ApiError {
    /// Classify a reply that was not 2xx. Only 5xx counts as the server's
    /// fault; 4xx and any other status are the caller's.
    pub fn from_response(response: ApiResponse) -> Self {
        if response.is_server_error() {
            ApiError::Server {
                status: response.status,
                body: response.body,
            }
        } else {
            ApiError::Client {
                status: response.status,
                body: response.body,
            }
        }
    }

    /// Whether the retry wrapper should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Server { .. } | ApiError::Network(_))
    }

    /// The HTTP status behind this error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A network-level failure reported by a [`crate::pipeline::transport::Transport`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

/// A non-fatal error for a single segment.
///
/// The batch continues with the next segment; the aggregate only becomes an
/// error when no segment at all succeeded.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize, PartialEq)]
pub enum SegmentError {
    /// The API call failed (client error, or retries exhausted).
    #[error("Segment {segment} (pages {pages}): request failed after {retries} retries: {detail}")]
    RequestFailed {
        segment: usize,
        pages: String,
        retries: u32,
        detail: String,
    },

    /// The call succeeded but the reply could not be parsed.
    #[error("Segment {segment} (pages {pages}): malformed response: {detail}")]
    MalformedResponse {
        segment: usize,
        pages: String,
        detail: String,
    },
}

/// Keep error messages readable when the raw body is a whole page of text.
fn preview(raw: &str) -> String {
    const MAX: usize = 200;
    if raw.chars().count() <= MAX {
        raw.to_string()
    } else {
        let cut: String = raw.chars().take(MAX).collect();
        format!("{cut}\u{2026}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = StudyError::PartialFailure {
            processed: 4,
            failed: 1,
            total: 5,
        };
        assert!(e.to_string().contains("1/5"), "got: {e}");
    }

    #[test]
    fn invalid_request_renders_its_message_only() {
        let e = StudyError::InvalidRequest("notes.png is an image, not a PDF".into());
        assert_eq!(e.to_string(), "notes.png is an image, not a PDF");
        assert!(!e.to_string().contains("HTTP/HTTPS URL"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ApiError::Server { status: 503, body: String::new() }.is_retryable());
        assert!(ApiError::Network(TransportError::Timeout { secs: 5 }).is_retryable());
        assert!(!ApiError::Client { status: 404, body: String::new() }.is_retryable());
        assert!(!ApiError::MalformedResponse {
            reason: "eof".into(),
            raw: "{".into()
        }
        .is_retryable());
    }

    #[test]
    fn non_success_replies_are_classified_by_status() {
        let server = ApiError::from_response(ApiResponse::new(503, "busy"));
        assert!(server.is_retryable());
        assert_eq!(server.status(), Some(503));

        let client = ApiError::from_response(ApiResponse::new(429, "quota"));
        assert!(!client.is_retryable());
        assert!(matches!(client, ApiError::Client { status: 429, .. }));

        assert!(!ApiError::from_response(ApiResponse::new(301, "")).is_retryable());
    }

    #[test]
    fn exhausted_is_distinct_from_cause() {
        let e = ApiError::RetriesExhausted {
            attempts: 4,
            last_error: "API server error HTTP 500: boom".into(),
        };
        assert_eq!(e.status(), None);
        assert!(e.to_string().contains("4 attempts"));
        assert!(e.to_string().contains("HTTP 500"));
    }

    #[test]
    fn malformed_display_truncates_raw() {
        let raw = "x".repeat(1000);
        let e = ApiError::MalformedResponse {
            reason: "expected value".into(),
            raw: raw.clone(),
        };
        let msg = e.to_string();
        assert!(msg.len() < 400, "message too long: {}", msg.len());
        // The full text is still available for diagnostics.
        if let ApiError::MalformedResponse { raw: kept, .. } = e {
            assert_eq!(kept.len(), 1000);
        }
    }

    #[test]
    fn api_error_converts_into_study_error() {
        let e: StudyError = ApiError::Client {
            status: 401,
            body: "bad key".into(),
        }
        .into();
        assert!(e.to_string().contains("401"));
        assert!(e.to_string().contains("bad key"));
    }

    #[test]
    fn segment_error_serialises() {
        let e = SegmentError::RequestFailed {
            segment: 2,
            pages: "3".into(),
            retries: 3,
            detail: "HTTP 503".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("RequestFailed"));
        assert!(e.to_string().contains("Segment 2"));
    }
}
