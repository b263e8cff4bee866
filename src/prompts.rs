//! Prompts for study-content extraction and question generation.
//!
//! Every prompt pins the exact JSON shape the parser expects, so the
//! structs in [`crate::output`] and the text here must change together.
//! Callers can override the analysis prompts via
//! [`crate::config::StudyConfig::analysis_prompt`].

use crate::config::{Difficulty, QuestionKind};

/// JSON shape shared by the image and PDF analysis prompts.
const STUDY_CONTENT_SCHEMA: &str = r#"{
  "title": "short title for this material",
  "summary": "3-6 sentence summary of what a student must understand",
  "key_points": ["one exam-relevant fact, rule or idea per entry"],
  "topics": ["broad topic names"],
  "definitions": [{"term": "term", "definition": "precise definition"}],
  "exam_tips": ["likely exam questions, common mistakes, things to memorise"]
}"#;

/// Analyse a photo or screenshot of study material.
pub const IMAGE_ANALYSIS_PROMPT: &str = r#"You are an experienced tutor helping a student prepare for an exam.
The image shows study material: a textbook page, lecture slide, handwritten notes, or a whiteboard.

1. Read ALL legible text, formulas, diagrams and tables in the image.
2. Extract only content that could plausibly be examined.
3. Write key points as self-contained statements a student can revise from.
4. Copy formulas exactly; use plain text or LaTeX notation.
5. If part of the image is illegible, ignore it rather than guessing.
6. If the image contains no study material, return empty lists and an empty summary.

Respond with ONLY a JSON object of this exact shape, no markdown fences, no commentary:
"#;

/// Analyse the extracted text of one PDF segment.
pub const PDF_ANALYSIS_PROMPT: &str = r#"You are an experienced tutor helping a student prepare for an exam.
Below is text extracted from one or more pages of a course document. Extraction may have
broken lines, merged columns or lost formatting; reconstruct the meaning.

1. Extract only exam-relevant content: concepts, facts, rules, formulas, dates, processes.
2. Ignore headers, footers, page numbers, tables of contents and references.
3. Write key points as self-contained statements a student can revise from.
4. Keep definitions precise and faithful to the source.
5. If the text has no study content, return empty lists and an empty summary.

Respond with ONLY a JSON object of this exact shape, no markdown fences, no commentary:
"#;

/// Full image-analysis prompt including the schema.
pub fn image_prompt(custom: Option<&str>) -> String {
    with_schema(custom.unwrap_or(IMAGE_ANALYSIS_PROMPT))
}

/// Full PDF-analysis prompt including the schema.
pub fn pdf_prompt(custom: Option<&str>) -> String {
    with_schema(custom.unwrap_or(PDF_ANALYSIS_PROMPT))
}

fn with_schema(prompt: &str) -> String {
    format!("{}\n{}", prompt.trim_end(), STUDY_CONTENT_SCHEMA)
}

/// Build the question-generation prompt for `source` material.
pub fn question_prompt(
    source: &str,
    count: usize,
    difficulty: Difficulty,
    kinds: &[QuestionKind],
) -> String {
    let kinds_list = kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are writing an exam for a student. Using ONLY the study material below, write exactly {count} questions.

Difficulty: {difficulty}
- easy: recall of facts and definitions
- medium: understanding and simple application
- hard: multi-step reasoning, comparisons and edge cases

Allowed question kinds: {kinds_list}
- multiple_choice: exactly 4 options, one correct; "answer" must repeat the correct option text exactly
- true_false: "options" is ["True", "False"]; "answer" is "True" or "False"
- short_answer: "options" is []; "answer" is a model answer of at most two sentences

Every question needs a one-sentence "explanation" citing the material. Do not repeat questions.

Respond with ONLY a JSON object of this exact shape, no markdown fences, no commentary:
{{
  "title": "quiz title",
  "questions": [
    {{"kind": "multiple_choice", "question": "...", "options": ["...", "...", "...", "..."], "answer": "...", "explanation": "...", "topic": "..."}}
  ]
}}

STUDY MATERIAL:
"""
{source}
""""#
    )
}
