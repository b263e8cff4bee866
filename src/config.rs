//! Configuration types for study-content extraction and quiz generation.
//!
//! All behaviour is controlled through [`StudyConfig`], built via its
//! [`StudyConfigBuilder`]. One struct carries every knob so a config can be
//! shared across tasks, logged, and compared between runs.

use crate::error::StudyError;
use crate::pipeline::transport::Transport;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default REST base for the Generative Language API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables checked, in order, for an API key.
pub const API_KEY_ENV_VARS: [&str; 3] = ["STUDYQUIZ_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Configuration for analysis and quiz generation.
///
/// # Example
/// ```rust
/// use studyquiz::StudyConfig;
///
/// let config = StudyConfig::builder()
///     .model("gemini-2.0-flash")
///     .pages_per_segment(2)
///     .question_count(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct StudyConfig {
    /// Gemini model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// API key. If None, read from [`API_KEY_ENV_VARS`].
    pub api_key: Option<String>,

    /// REST base URL. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Pre-constructed transport. Takes precedence over `api_key`.
    ///
    /// Tests inject a [`crate::pipeline::transport::MockTransport`] here.
    pub transport: Option<Arc<dyn Transport>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Extraction wants faithful output; question generation tolerates a
    /// little more variety, so the default sits just above zero.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 8192.
    pub max_output_tokens: u32,

    /// Retries after the first attempt on 5xx / network errors. Default: 3.
    ///
    /// 4xx responses are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each retry. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Upper bound for a single backoff wait. Default: 16 000.
    pub max_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF page selection. Default: all pages.
    pub pages: PageSelection,

    /// Consecutive pages grouped into one model call. Default: 1.
    pub pages_per_segment: usize,

    /// Segments with fewer trimmed characters are skipped. Default: 50.
    ///
    /// Title pages, blank separators and image-only pages carry no text the
    /// model could summarise; sending them wastes a call and quota.
    pub min_segment_chars: usize,

    /// Segment text is truncated to this many characters. Default: 30 000.
    pub max_segment_chars: usize,

    /// Fixed pause between consecutive model calls in a batch. Default: 1000.
    pub inter_request_delay_ms: u64,

    /// Longest image edge sent to the API, in pixels. Default: 2048.
    pub max_image_dimension: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom analysis prompt. If None, the built-in image/PDF prompts are used.
    pub analysis_prompt: Option<String>,

    /// Number of questions to request. Range 1–50. Default: 10.
    pub question_count: usize,

    /// Question difficulty. Default: [`Difficulty::Medium`].
    pub difficulty: Difficulty,

    /// Question kinds the model may use. Default: multiple choice only.
    pub question_kinds: Vec<QuestionKind>,

    /// Optional per-segment progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            transport: None,
            temperature: 0.2,
            max_output_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_backoff_ms: 16_000,
            request_timeout_secs: 120,
            download_timeout_secs: 120,
            pages: PageSelection::default(),
            pages_per_segment: 1,
            min_segment_chars: 50,
            max_segment_chars: 30_000,
            inter_request_delay_ms: 1000,
            max_image_dimension: 2048,
            password: None,
            analysis_prompt: None,
            question_count: 10,
            difficulty: Difficulty::default(),
            question_kinds: vec![QuestionKind::MultipleChoice],
            progress_callback: None,
        }
    }
}

impl fmt::Debug for StudyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn Transport>"))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("pages", &self.pages)
            .field("pages_per_segment", &self.pages_per_segment)
            .field("min_segment_chars", &self.min_segment_chars)
            .field("inter_request_delay_ms", &self.inter_request_delay_ms)
            .field("question_count", &self.question_count)
            .field("difficulty", &self.difficulty)
            .field("question_kinds", &self.question_kinds)
            .finish()
    }
}

impl StudyConfig {
    /// Create a new builder for `StudyConfig`.
    pub fn builder() -> StudyConfigBuilder {
        StudyConfigBuilder {
            config: Self::default(),
        }
    }

    /// The explicit key, else the first non-empty key from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.is_empty())
    }
}

/// Builder for [`StudyConfig`].
pub struct StudyConfigBuilder {
    config: StudyConfig,
}

impl fmt::Debug for StudyConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl StudyConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn pages_per_segment(mut self, n: usize) -> Self {
        self.config.pages_per_segment = n;
        self
    }

    pub fn min_segment_chars(mut self, n: usize) -> Self {
        self.config.min_segment_chars = n;
        self
    }

    pub fn max_segment_chars(mut self, n: usize) -> Self {
        self.config.max_segment_chars = n;
        self
    }

    pub fn inter_request_delay_ms(mut self, ms: u64) -> Self {
        self.config.inter_request_delay_ms = ms;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(64);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn analysis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.analysis_prompt = Some(prompt.into());
        self
    }

    pub fn question_count(mut self, n: usize) -> Self {
        self.config.question_count = n;
        self
    }

    pub fn difficulty(mut self, d: Difficulty) -> Self {
        self.config.difficulty = d;
        self
    }

    pub fn question_kinds(mut self, kinds: Vec<QuestionKind>) -> Self {
        self.config.question_kinds = kinds;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StudyConfig, StudyError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(StudyError::InvalidConfig("model must not be empty".into()));
        }
        if c.pages_per_segment == 0 {
            return Err(StudyError::InvalidConfig(
                "pages per segment must be ≥ 1".into(),
            ));
        }
        if c.max_segment_chars < c.min_segment_chars {
            return Err(StudyError::InvalidConfig(format!(
                "max segment chars ({}) is below min segment chars ({})",
                c.max_segment_chars, c.min_segment_chars
            )));
        }
        if c.question_count == 0 || c.question_count > 50 {
            return Err(StudyError::InvalidConfig(format!(
                "question count must be 1–50, got {}",
                c.question_count
            )));
        }
        if c.question_kinds.is_empty() {
            return Err(StudyError::InvalidConfig(
                "at least one question kind is required".into(),
            ));
        }
        if c.retry_backoff_ms > c.max_backoff_ms {
            return Err(StudyError::InvalidConfig(format!(
                "retry backoff ({}ms) exceeds the backoff cap ({}ms)",
                c.retry_backoff_ms, c.max_backoff_ms
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How hard the generated questions should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Recall of definitions and facts.
    Easy,
    /// Understanding and simple application. (default)
    #[default]
    Medium,
    /// Multi-step reasoning, comparisons, edge cases.
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Question formats the model may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
            QuestionKind::ShortAnswer => "short_answer",
        }
    }
}

/// Specifies which pages of a PDF to analyse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = StudyConfig::default();
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_backoff_ms, 1000);
        assert_eq!(c.min_segment_chars, 50);
        assert_eq!(c.pages_per_segment, 1);
        assert_eq!(c.question_count, 10);
        assert_eq!(c.difficulty, Difficulty::Medium);
    }

    #[test]
    fn builder_rejects_zero_pages_per_segment() {
        let err = StudyConfig::builder().pages_per_segment(0).build().unwrap_err();
        assert!(err.to_string().contains("pages per segment"));
    }

    #[test]
    fn builder_rejects_question_count_out_of_range() {
        assert!(StudyConfig::builder().question_count(0).build().is_err());
        assert!(StudyConfig::builder().question_count(51).build().is_err());
        assert!(StudyConfig::builder().question_count(50).build().is_ok());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = StudyConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = StudyConfig::builder().api_key("secret-key").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn explicit_api_key_wins() {
        let c = StudyConfig::builder().api_key("k1").build().unwrap();
        assert_eq!(c.resolve_api_key().as_deref(), Some("k1"));
    }

    #[test]
    fn page_selection_range_clips_to_document() {
        assert_eq!(PageSelection::Range(2, 10).to_indices(4), vec![1, 2, 3]);
        assert!(PageSelection::Single(9).to_indices(4).is_empty());
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(4), vec![0, 2]);
    }

    #[test]
    fn difficulty_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&Difficulty::Hard).unwrap(), "\"hard\"");
        assert_eq!(
            serde_json::to_string(&QuestionKind::TrueFalse).unwrap(),
            "\"true_false\""
        );
    }
}
