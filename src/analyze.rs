//! Top-level entry points: analyse a document, generate a quiz.
//!
//! ```text
//! input ─▶ resolve ─┬─ image ─▶ encode ─▶ 1 call ──────────────┐
//!                   └─ pdf ───▶ extract ─▶ segment ─▶ batch ───┴─▶ DocumentAnalysis
//!
//! DocumentAnalysis | text ─▶ question prompt ─▶ 1 call ─▶ validate ─▶ Quiz
//! ```

use crate::config::StudyConfig;
use crate::error::StudyError;
use crate::output::{
    DocumentAnalysis, DocumentMetadata, Question, Quiz, SegmentResult, SegmentStatus, StudyContent,
};
use crate::pipeline::gemini::{image_request, text_request, GenerationOptions};
use crate::pipeline::input::{self, InputKind, ResolvedInput};
use crate::pipeline::llm::request_json;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::transport::{HttpTransport, Transport};
use crate::pipeline::{batch, encode, extract, segment};
use crate::prompts::{image_prompt, question_prompt};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Analyse a PDF or image file (local path or URL).
///
/// The input kind is detected from the file's magic bytes.
///
/// # Errors
/// Returns `Err` only when nothing usable was produced: unreadable input, no
/// API configured, no extractable text, or every segment failed. A document
/// where some segments failed is `Ok`; check `stats.failed_segments`.
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    analyze_resolved(&resolved, config).await
}

/// Analyse in-memory bytes (e.g. an upload). `source_name` is used in results.
pub async fn analyze_bytes(
    bytes: &[u8],
    source_name: &str,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let resolved = input::resolve_bytes(bytes, source_name)?;
    analyze_resolved(&resolved, config).await
}

/// Analyse a single image. Fails if the input is not an image.
pub async fn analyze_image(
    input_str: impl AsRef<str>,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    if !resolved.kind().is_image() {
        return Err(StudyError::InvalidRequest(format!(
            "{} is a PDF, not an image",
            resolved.source_name()
        )));
    }
    analyze_resolved(&resolved, config).await
}

/// Analyse a PDF page by page. Fails if the input is not a PDF.
pub async fn analyze_pdf(
    input_str: impl AsRef<str>,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    if resolved.kind() != InputKind::Pdf {
        return Err(StudyError::InvalidRequest(format!(
            "{} is an image, not a PDF",
            resolved.source_name()
        )));
    }
    analyze_resolved(&resolved, config).await
}

/// Analyse and write the result as pretty JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn analyze_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let analysis = analyze(input_str, config).await?;
    let json = serde_json::to_string_pretty(&analysis)
        .map_err(|e| StudyError::Internal(format!("serialise analysis: {e}")))?;
    write_atomic(output_path.as_ref(), json.as_bytes()).await?;
    Ok(analysis)
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| StudyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

/// Read PDF metadata without analysing content.
///
/// Does not require an API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, StudyError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    if resolved.kind() != InputKind::Pdf {
        return Err(StudyError::InvalidRequest(format!(
            "{} is not a PDF",
            resolved.source_name()
        )));
    }
    let mut meta = extract::extract_metadata(resolved.path(), None).await?;
    meta.source = resolved.source_name().to_string();
    Ok(meta)
}

/// Generate a quiz from free text (notes, a summary, a chapter).
pub async fn generate_quiz(source: &str, config: &StudyConfig) -> Result<Quiz, StudyError> {
    if source.trim().is_empty() {
        return Err(StudyError::InvalidRequest("quiz source text is empty".into()));
    }
    let transport = resolve_transport(config)?;
    generate_quiz_with(transport.as_ref(), source, config).await
}

/// Generate a quiz from a previous analysis.
pub async fn generate_quiz_from_analysis(
    analysis: &DocumentAnalysis,
    config: &StudyConfig,
) -> Result<Quiz, StudyError> {
    let mut quiz = generate_quiz(&analysis.quiz_source(), config).await?;
    if quiz.title.is_none() {
        quiz.title = Some(analysis.display_title());
    }
    Ok(quiz)
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn analyze_resolved(
    resolved: &ResolvedInput,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let transport = resolve_transport(config)?;
    match resolved.kind() {
        InputKind::Pdf => analyze_pdf_with(transport.as_ref(), resolved, config).await,
        InputKind::Png | InputKind::Jpeg => {
            analyze_image_with(transport.as_ref(), resolved, config).await
        }
    }
}

async fn analyze_pdf_with(
    transport: &dyn Transport,
    resolved: &ResolvedInput,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let total_start = Instant::now();
    let path = resolved.path();

    // ── Step 1: metadata + text ──────────────────────────────────────────
    let extract_start = Instant::now();
    let mut metadata = extract::extract_metadata(path, config.password.as_deref()).await?;
    metadata.source = resolved.source_name().to_string();
    let pages = extract::extract_pages(path, config.password.as_deref(), &config.pages).await?;
    let extraction_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted text from {} of {} pages in {}ms",
        pages.len(),
        metadata.page_count,
        extraction_duration_ms
    );

    // ── Step 2: segment ──────────────────────────────────────────────────
    let segments = segment::segment_pages(&pages, config.pages_per_segment, config.max_segment_chars);

    // ── Step 3: one call per segment ─────────────────────────────────────
    let api_start = Instant::now();
    let results = batch::run_batch(transport, &segments, config).await;
    let api_duration_ms = api_start.elapsed().as_millis() as u64;

    let mut analysis =
        DocumentAnalysis::from_segments(resolved.source_name(), InputKind::Pdf, results);
    analysis.metadata = Some(metadata);
    analysis.stats.extraction_duration_ms = extraction_duration_ms;
    analysis.stats.api_duration_ms = api_duration_ms;
    analysis.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    check_outcome(analysis, config)
}

async fn analyze_image_with(
    transport: &dyn Transport,
    resolved: &ResolvedInput,
    config: &StudyConfig,
) -> Result<DocumentAnalysis, StudyError> {
    let total_start = Instant::now();
    let source_name = resolved.source_name().to_string();

    let bytes = tokio::fs::read(resolved.path())
        .await
        .map_err(|e| StudyError::ImageFailed {
            source_name: source_name.clone(),
            detail: e.to_string(),
        })?;
    let max_dim = config.max_image_dimension;
    let image = tokio::task::spawn_blocking(move || encode::encode_image(&bytes, max_dim))
        .await
        .map_err(|e| StudyError::Internal(format!("Encode task panicked: {e}")))?
        .map_err(|e| StudyError::ImageFailed {
            source_name: source_name.clone(),
            detail: e.to_string(),
        })?;
    let extraction_duration_ms = total_start.elapsed().as_millis() as u64;

    let request = image_request(
        &config.model,
        &image_prompt(config.analysis_prompt.as_deref()),
        &image,
        GenerationOptions::from_config(config),
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_start(1);
        cb.on_segment_start(1, 1);
    }

    let api_start = Instant::now();
    let result = request_json::<StudyContent>(transport, &request, &RetryPolicy::from_config(config)).await;
    let api_duration_ms = api_start.elapsed().as_millis() as u64;

    // Unlike a PDF segment, a lone image has nothing to fall back on.
    let (content, stats) = match result {
        Ok(ok) => ok,
        Err(e) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_segment_error(1, 1, e.to_string());
                cb.on_analysis_complete(1, 0);
            }
            return Err(e.into());
        }
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_segment_complete(1, 1, content.key_points.len());
        cb.on_analysis_complete(1, 1);
    }
    if content.is_empty() {
        warn!("{}: the model found no study content in the image", source_name);
    }

    let segment = SegmentResult {
        index: 1,
        first_page: 1,
        last_page: 1,
        status: SegmentStatus::Processed,
        content: Some(content),
        input_tokens: stats.input_tokens,
        output_tokens: stats.output_tokens,
        duration_ms: stats.duration_ms,
        retries: stats.retries,
    };

    let mut analysis = DocumentAnalysis::from_segments(source_name, resolved.kind(), vec![segment]);
    analysis.stats.extraction_duration_ms = extraction_duration_ms;
    analysis.stats.api_duration_ms = api_duration_ms;
    analysis.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(analysis)
}

/// Turn a batch aggregate into the caller-facing result.
fn check_outcome(analysis: DocumentAnalysis, config: &StudyConfig) -> Result<DocumentAnalysis, StudyError> {
    let stats = &analysis.stats;

    if stats.processed_segments == 0 && stats.failed_segments == 0 {
        return Err(StudyError::NoExtractableText {
            source_name: analysis.source.clone(),
            skipped: stats.skipped_segments,
            min_chars: config.min_segment_chars,
        });
    }

    if stats.processed_segments == 0 {
        let first_error = analysis
            .failures()
            .next()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(StudyError::AllSegmentsFailed {
            total: stats.failed_segments,
            retries: config.max_retries,
            first_error,
        });
    }

    info!(
        "Analysis complete: {}/{} segments, {} key points, {}ms",
        stats.processed_segments,
        stats.total_segments,
        analysis.key_points.len(),
        stats.total_duration_ms
    );
    Ok(analysis)
}

#[derive(Debug, Deserialize)]
struct QuizReply {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    questions: Vec<Question>,
}

/// Quiz generation against an explicit transport.
pub async fn generate_quiz_with(
    transport: &dyn Transport,
    source: &str,
    config: &StudyConfig,
) -> Result<Quiz, StudyError> {
    let prompt = question_prompt(
        source.trim(),
        config.question_count,
        config.difficulty,
        &config.question_kinds,
    );
    let request = text_request(
        &config.model,
        &prompt,
        "Write the quiz now.",
        GenerationOptions::from_config(config),
    );

    let (reply, stats) =
        request_json::<QuizReply>(transport, &request, &RetryPolicy::from_config(config)).await?;
    let returned = reply.questions.len();

    let mut questions = Vec::with_capacity(returned);
    for (i, q) in reply.questions.into_iter().enumerate() {
        if !config.question_kinds.contains(&q.kind) {
            warn!("Question {}: kind {} was not requested, dropped", i + 1, q.kind.as_str());
            continue;
        }
        match q.problem() {
            None => questions.push(q),
            Some(problem) => warn!("Question {}: {}, dropped", i + 1, problem),
        }
    }

    if questions.is_empty() {
        return Err(StudyError::NoValidQuestions { returned });
    }
    if questions.len() < config.question_count {
        warn!(
            "Requested {} questions, kept {} of {} returned",
            config.question_count,
            questions.len(),
            returned
        );
    }
    questions.truncate(config.question_count);

    Ok(Quiz {
        title: reply.title,
        difficulty: config.difficulty,
        discarded: returned - questions.len(),
        questions,
        input_tokens: stats.input_tokens,
        output_tokens: stats.output_tokens,
    })
}

/// Pick the transport, from most- to least-specific.
///
/// 1. **Pre-built transport** (`config.transport`): tests and callers with
///    custom middleware.
/// 2. **API key**: explicit `config.api_key`, else `STUDYQUIZ_API_KEY`,
///    `GEMINI_API_KEY`, `GOOGLE_API_KEY`.
pub(crate) fn resolve_transport(config: &StudyConfig) -> Result<Arc<dyn Transport>, StudyError> {
    if let Some(ref transport) = config.transport {
        return Ok(Arc::clone(transport));
    }

    let api_key = config
        .resolve_api_key()
        .ok_or_else(|| StudyError::ProviderNotConfigured {
            hint: "No API key found.\nSet GEMINI_API_KEY (or STUDYQUIZ_API_KEY / GOOGLE_API_KEY), or pass --api-key.".to_string(),
        })?;

    let transport = HttpTransport::new(&config.base_url, api_key, config.request_timeout_secs)
        .map_err(|e| StudyError::ProviderNotConfigured {
            hint: format!("HTTP client could not be built: {e}"),
        })?;
    Ok(Arc::new(transport))
}

pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StudyError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StudyError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_path);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| StudyError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StudyError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
