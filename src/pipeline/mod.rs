//! Pipeline stages for study-material analysis.
//!
//! Each submodule implements exactly one step. Only [`transport`] touches
//! the network, and only [`extract`] touches pdfium.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─ image ─▶ encode ───────────────────┐
//! input ─────┤                                     ├─▶ llm ─▶ (typed result)
//! (URL/path) └─ pdf ───▶ extract ─▶ segment ─▶ batch ┘
//!
//! llm = gemini::request ─▶ retry(transport) ─▶ gemini::extract_reply ─▶ sanitize
//! ```
//!
//! 1. [`input`]:     canonicalise the user-supplied path or URL to a local
//!    file and sniff its kind
//! 2. [`extract`]:   pull the text layer of selected pages; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`segment`]:   group pages into segments, one model call each
//! 4. [`encode`]:    downscale and base64-wrap an image for inline upload
//! 5. [`batch`]:     sequential per-segment calls with failure isolation
//! 6. [`llm`]:       one call end to end, built from:
//!    [`gemini`] (request/response envelope), [`retry`] (backoff policy),
//!    [`transport`] (HTTP or mock), [`sanitize`] (fence stripping + JSON parse)

pub mod batch;
pub mod encode;
pub mod extract;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod retry;
pub mod sanitize;
pub mod segment;
pub mod transport;
