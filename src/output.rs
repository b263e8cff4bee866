//! Result types returned by analysis and quiz generation.
//!
//! Everything here is `Serialize + Deserialize` so results can be written as
//! JSON, stored in the history file, and read back to generate a quiz later.

use crate::config::{Difficulty, QuestionKind};
use crate::error::{SegmentError, StudyError};
use crate::pipeline::input::InputKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Study content extracted from one image or one PDF segment.
///
/// Every field defaults so a model reply that omits one still parses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyContent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub definitions: Vec<Definition>,
    #[serde(default)]
    pub exam_tips: Vec<String>,
}

impl StudyContent {
    /// True when the model returned nothing worth studying.
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty() && self.key_points.is_empty() && self.definitions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub term: String,
    pub definition: String,
}

/// What happened to a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    Processed,
    /// Below the minimum text length; no call was made.
    Skipped { chars: usize },
    Failed { error: SegmentError },
}

/// The outcome for one segment of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    /// 1-indexed position in the batch.
    pub index: usize,
    pub first_page: usize,
    pub last_page: usize,
    #[serde(flatten)]
    pub status: SegmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<StudyContent>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
    pub retries: u32,
}

impl SegmentResult {
    pub fn is_processed(&self) -> bool {
        matches!(self.status, SegmentStatus::Processed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, SegmentStatus::Skipped { .. })
    }

    pub fn error(&self) -> Option<&SegmentError> {
        match &self.status {
            SegmentStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Counters for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_segments: usize,
    pub processed_segments: usize,
    pub failed_segments: usize,
    pub skipped_segments: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extraction_duration_ms: u64,
    pub api_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// PDF document metadata, available without an API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    pub source: String,
}

/// Aggregate analysis of an image or a whole PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// Path or URL the content came from.
    pub source: String,
    pub kind: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    /// Every segment in order, whatever its status.
    pub segments: Vec<SegmentResult>,
    /// Key points of all processed segments, flattened, first occurrence kept.
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub definitions: Vec<Definition>,
    pub exam_tips: Vec<String>,
    pub stats: AnalysisStats,
}

impl DocumentAnalysis {
    /// Build the aggregate from ordered segment results.
    pub fn from_segments(source: impl Into<String>, kind: InputKind, segments: Vec<SegmentResult>) -> Self {
        let mut key_points = Vec::new();
        let mut topics = Vec::new();
        let mut definitions = Vec::new();
        let mut exam_tips = Vec::new();
        let mut seen_points = HashSet::new();
        let mut seen_topics = HashSet::new();
        let mut seen_terms = HashSet::new();
        let mut seen_tips = HashSet::new();

        for content in segments.iter().filter_map(|s| s.content.as_ref()) {
            push_unique(&mut key_points, &mut seen_points, &content.key_points);
            push_unique(&mut topics, &mut seen_topics, &content.topics);
            push_unique(&mut exam_tips, &mut seen_tips, &content.exam_tips);
            for d in &content.definitions {
                if seen_terms.insert(normalise(&d.term)) {
                    definitions.push(d.clone());
                }
            }
        }

        let stats = AnalysisStats {
            total_segments: segments.len(),
            processed_segments: segments.iter().filter(|s| s.is_processed()).count(),
            failed_segments: segments.iter().filter(|s| s.error().is_some()).count(),
            skipped_segments: segments.iter().filter(|s| s.is_skipped()).count(),
            total_input_tokens: segments.iter().map(|s| s.input_tokens as u64).sum(),
            total_output_tokens: segments.iter().map(|s| s.output_tokens as u64).sum(),
            ..Default::default()
        };

        Self {
            source: source.into(),
            kind,
            metadata: None,
            segments,
            key_points,
            topics,
            definitions,
            exam_tips,
            stats,
        }
    }

    /// Successful segment contents, in order.
    pub fn contents(&self) -> impl Iterator<Item = &StudyContent> {
        self.segments.iter().filter_map(|s| s.content.as_ref())
    }

    /// Segment errors, in order.
    pub fn failures(&self) -> impl Iterator<Item = &SegmentError> {
        self.segments.iter().filter_map(|s| s.error())
    }

    /// Treat any failed segment as an error.
    pub fn into_result(self) -> Result<Self, StudyError> {
        if self.stats.failed_segments > 0 {
            Err(StudyError::PartialFailure {
                processed: self.stats.processed_segments,
                failed: self.stats.failed_segments,
                total: self.stats.total_segments,
            })
        } else {
            Ok(self)
        }
    }

    /// Plain-text digest used as the source for quiz generation.
    pub fn quiz_source(&self) -> String {
        let mut out = String::new();
        for content in self.contents() {
            if let Some(ref t) = content.title {
                out.push_str(&format!("## {}\n", t.trim()));
            }
            if !content.summary.trim().is_empty() {
                out.push_str(content.summary.trim());
                out.push_str("\n\n");
            }
        }
        if !self.key_points.is_empty() {
            out.push_str("Key points:\n");
            for p in &self.key_points {
                out.push_str(&format!("- {}\n", p));
            }
            out.push('\n');
        }
        if !self.definitions.is_empty() {
            out.push_str("Definitions:\n");
            for d in &self.definitions {
                out.push_str(&format!("- {}: {}\n", d.term, d.definition));
            }
        }
        out.trim_end().to_string()
    }

    /// A short human title: first model title, else PDF title, else source.
    pub fn display_title(&self) -> String {
        self.contents()
            .find_map(|c| c.title.clone())
            .or_else(|| self.metadata.as_ref().and_then(|m| m.title.clone()))
            .unwrap_or_else(|| self.source.clone())
    }
}

fn normalise(s: &str) -> String {
    s.trim().to_lowercase()
}

fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, items: &[String]) {
    for item in items {
        let trimmed = item.trim();
        if !trimmed.is_empty() && seen.insert(normalise(trimmed)) {
            out.push(trimmed.to_string());
        }
    }
}

// ── Quiz ─────────────────────────────────────────────────────────────────

/// One quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default = "default_kind", alias = "type")]
    pub kind: QuestionKind,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

fn default_kind() -> QuestionKind {
    QuestionKind::MultipleChoice
}

impl Question {
    /// Why this question is unusable, if it is.
    pub fn problem(&self) -> Option<String> {
        if self.question.trim().is_empty() {
            return Some("empty question text".into());
        }
        if self.answer.trim().is_empty() {
            return Some("empty answer".into());
        }
        match self.kind {
            QuestionKind::MultipleChoice => {
                if self.options.len() < 2 {
                    return Some(format!("{} options (need at least 2)", self.options.len()));
                }
                if self.answer_index().is_none() {
                    return Some(format!("answer '{}' is not one of the options", self.answer));
                }
            }
            QuestionKind::TrueFalse => {
                let a = self.answer.trim().to_lowercase();
                if a != "true" && a != "false" {
                    return Some(format!("true/false answer is '{}'", self.answer));
                }
            }
            QuestionKind::ShortAnswer => {}
        }
        None
    }

    /// Index of the correct option for multiple-choice questions.
    ///
    /// Accepts the option text itself or a letter (`"B"`, `"b)"`).
    pub fn answer_index(&self) -> Option<usize> {
        let answer = self.answer.trim();
        if let Some(i) = self
            .options
            .iter()
            .position(|o| o.trim().eq_ignore_ascii_case(answer))
        {
            return Some(i);
        }
        let letter = answer.trim_end_matches([')', '.', ':']);
        if letter.len() == 1 {
            let c = letter.chars().next()?.to_ascii_uppercase();
            if c.is_ascii_uppercase() {
                let i = (c as u8 - b'A') as usize;
                return (i < self.options.len()).then_some(i);
            }
        }
        None
    }
}

/// A generated quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default)]
    pub title: Option<String>,
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
    /// Questions the model returned but the quiz does not keep (invalid or surplus).
    #[serde(default)]
    pub discarded: usize,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}
