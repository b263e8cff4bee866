//! CLI binary for studyquiz.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `StudyConfig`, prints results and records them in the history file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use studyquiz::{
    analyze, generate_quiz, generate_quiz_from_analysis, inspect, AnalysisProgressCallback,
    Difficulty, DocumentAnalysis, EntryKind, HistoryEntry, HistoryFilter, HistoryStore,
    JsonlHistoryStore, PageSelection, ProgressCallback, QuestionKind, Quiz, StudyConfig,
    StudyConfigBuilder,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per segment.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} segments  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, segment: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&segment)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_segments: usize) {
        self.activate_bar(total_segments);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_segments} segments…"))
        ));
    }

    fn on_segment_start(&self, segment: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(segment, Instant::now());
        self.bar.set_message(format!("segment {segment}"));
    }

    fn on_segment_complete(&self, segment: usize, total: usize, key_points: usize) {
        let secs = self.elapsed_secs(segment);
        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {:<14}  {}",
            green("✓"),
            segment,
            total,
            dim(&format!("{key_points:>3} key points")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_segment_skipped(&self, segment: usize, total: usize, chars: usize) {
        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {}",
            dim("·"),
            segment,
            total,
            dim(&format!("skipped ({chars} chars)")),
        ));
        self.bar.inc(1);
    }

    fn on_segment_error(&self, segment: usize, total: usize, error: String) {
        let secs = self.elapsed_secs(segment);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };

        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {}  {}",
            red("✗"),
            segment,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_analysis_complete(&self, total_segments: usize, processed: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} of {} segments analysed",
                green("✔"),
                bold(&processed.to_string()),
                total_segments
            );
        } else {
            eprintln!(
                "{} {}/{} segments analysed  ({} failed)",
                if processed == 0 { red("✘") } else { cyan("⚠") },
                bold(&processed.to_string()),
                total_segments,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Key points from a lecture PDF
  studyquiz analyze lecture-03.pdf

  # Two pages per call, pages 10-40, full JSON to a file
  studyquiz analyze --pages 10-40 --pages-per-segment 2 book.pdf -o book.json

  # Photo of handwritten notes
  studyquiz analyze notes.jpg

  # Quiz from a PDF, a previous analysis, plain notes, or a history entry
  studyquiz quiz lecture-03.pdf --count 5 --difficulty hard
  studyquiz quiz book.json --kinds multiple-choice,true-false
  studyquiz quiz summary.md
  studyquiz quiz --from-history 20261017093012123-48213-000

  # PDF metadata (no API key needed)
  studyquiz inspect book.pdf

  # Past runs
  studyquiz history list --kind quiz --limit 10
  studyquiz history export 20261017093012123-48213-000 -o quiz.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY        Gemini API key (also STUDYQUIZ_API_KEY, GOOGLE_API_KEY)
  STUDYQUIZ_MODEL       Model ID (default gemini-2.0-flash)
  STUDYQUIZ_HISTORY     History file (default: per-user data directory)
  PDFIUM_LIB_PATH       Directory containing libpdfium
  RUST_LOG              Log filter, e.g. studyquiz=debug
"#;

/// Study content and quizzes from PDFs and images.
#[derive(Parser, Debug)]
#[command(
    name = "studyquiz",
    version,
    about = "Extract study content from PDFs and images, and generate quizzes",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Gemini API key. Falls back to GEMINI_API_KEY / GOOGLE_API_KEY.
    #[arg(long, global = true, env = "STUDYQUIZ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model ID.
    #[arg(long, global = true, env = "STUDYQUIZ_MODEL")]
    model: Option<String>,

    /// API base URL (for proxies and test servers).
    #[arg(long, global = true, env = "STUDYQUIZ_BASE_URL")]
    base_url: Option<String>,

    /// Retries after the first attempt on 5xx / network errors.
    #[arg(long, global = true, env = "STUDYQUIZ_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per retry.
    #[arg(long, global = true, env = "STUDYQUIZ_RETRY_BACKOFF_MS", default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "STUDYQUIZ_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// History file (JSON lines).
    #[arg(long, global = true, env = "STUDYQUIZ_HISTORY")]
    history_file: Option<PathBuf>,

    /// Do not record this run in the history file.
    #[arg(long, global = true)]
    no_history: bool,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "STUDYQUIZ_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STUDYQUIZ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "STUDYQUIZ_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract study content from a PDF or image.
    Analyze(AnalyzeArgs),
    /// Generate a quiz.
    Quiz(QuizArgs),
    /// Print PDF metadata only, no API calls.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
    },
    /// Browse and export past runs.
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Args, Debug)]
struct DocumentArgs {
    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "STUDYQUIZ_PAGES", default_value = "all")]
    pages: String,

    /// Consecutive pages per model call.
    #[arg(long, env = "STUDYQUIZ_PAGES_PER_SEGMENT", default_value_t = 1)]
    pages_per_segment: usize,

    /// Segments with fewer characters are skipped.
    #[arg(long, env = "STUDYQUIZ_MIN_CHARS", default_value_t = 50)]
    min_chars: usize,

    /// Pause between model calls in milliseconds.
    #[arg(long, env = "STUDYQUIZ_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "STUDYQUIZ_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to a text file containing a custom analysis prompt.
    #[arg(long)]
    prompt: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Local PDF/PNG/JPEG path or HTTP/HTTPS URL.
    input: String,

    /// Write the full analysis as JSON to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    doc: DocumentArgs,
}

#[derive(Args, Debug)]
struct QuizArgs {
    /// PDF/image (analysed first), analysis JSON, or a .txt/.md notes file.
    #[arg(required_unless_present = "from_history")]
    input: Option<String>,

    /// Build the quiz from a recorded analysis instead of INPUT.
    #[arg(long, conflicts_with = "input")]
    from_history: Option<String>,

    /// Number of questions (1–50).
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    #[arg(short, long, value_enum, default_value = "medium")]
    difficulty: DifficultyArg,

    /// Allowed question kinds.
    #[arg(long, value_enum, value_delimiter = ',', default_value = "multiple-choice")]
    kinds: Vec<KindArg>,

    /// Write the quiz as JSON to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Omit the answer key from text output.
    #[arg(long)]
    no_answers: bool,

    #[command(flatten)]
    doc: DocumentArgs,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List entries, newest first.
    List {
        #[arg(long, value_enum)]
        kind: Option<KindFilterArg>,
        /// Only entries whose source contains this text.
        #[arg(long)]
        source: Option<String>,
        /// Only entries from the last N days.
        #[arg(long)]
        days: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one entry's payload as JSON.
    Show { id: String },
    /// Write one entry's payload to a file.
    Export {
        id: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(v: DifficultyArg) -> Self {
        match v {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl From<KindArg> for QuestionKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::MultipleChoice => QuestionKind::MultipleChoice,
            KindArg::TrueFalse => QuestionKind::TrueFalse,
            KindArg::ShortAnswer => QuestionKind::ShortAnswer,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindFilterArg {
    Analysis,
    Quiz,
}

impl From<KindFilterArg> for EntryKind {
    fn from(v: KindFilterArg) -> Self {
        match v {
            KindFilterArg::Analysis => EntryKind::Analysis,
            KindFilterArg::Quiz => EntryKind::Quiz,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback in normal mode; library INFO
    // logs would interleave with it.
    let uses_bar = matches!(cli.command, Command::Analyze(_) | Command::Quiz(_));
    let show_progress = uses_bar && !g.quiet && !g.no_progress && !g.json;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let history = JsonlHistoryStore::new(history_path(g));

    match &cli.command {
        Command::Inspect { input } => run_inspect(input, g).await,
        Command::Analyze(args) => run_analyze(args, g, &history, show_progress).await,
        Command::Quiz(args) => run_quiz(args, g, &history, show_progress).await,
        Command::History { command } => run_history(command, g, &history),
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

async fn run_inspect(input: &str, g: &GlobalArgs) -> Result<()> {
    let meta = inspect(input).await.context("Failed to inspect PDF")?;

    if g.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
        );
        return Ok(());
    }

    println!("File:         {}", input);
    if let Some(ref t) = meta.title {
        println!("Title:        {}", t);
    }
    if let Some(ref a) = meta.author {
        println!("Author:       {}", a);
    }
    if let Some(ref s) = meta.subject {
        println!("Subject:      {}", s);
    }
    println!("Pages:        {}", meta.page_count);
    println!("PDF Version:  {}", meta.pdf_version);
    if let Some(ref p) = meta.producer {
        println!("Producer:     {}", p);
    }
    if let Some(ref c) = meta.creator {
        println!("Creator:      {}", c);
    }
    Ok(())
}

async fn run_analyze(
    args: &AnalyzeArgs,
    g: &GlobalArgs,
    history: &JsonlHistoryStore,
    show_progress: bool,
) -> Result<()> {
    let config = build_config(g, &args.doc, show_progress)
        .await?
        .build()
        .context("Invalid configuration")?;

    let analysis = analyze(&args.input, &config)
        .await
        .context("Analysis failed")?;

    record(g, history, HistoryEntry::from_analysis(&analysis));

    if let Some(ref path) = args.output {
        write_json(path, &analysis)?;
    }
    if g.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&analysis).context("Failed to serialise analysis")?
        );
    } else if !g.quiet || args.output.is_none() {
        print_analysis(&analysis);
    }

    if !g.quiet {
        let s = &analysis.stats;
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total{}",
            dim(&s.total_input_tokens.to_string()),
            dim(&s.total_output_tokens.to_string()),
            s.total_duration_ms,
            match args.output {
                Some(ref p) => format!("  →  {}", bold(&p.display().to_string())),
                None => String::new(),
            }
        );
    }
    Ok(())
}

async fn run_quiz(
    args: &QuizArgs,
    g: &GlobalArgs,
    history: &JsonlHistoryStore,
    show_progress: bool,
) -> Result<()> {
    let input = args.input.as_deref().unwrap_or_default();
    let kind = args.from_history.is_none().then(|| QuizSource::detect(input));
    let show_progress = show_progress && kind.is_some_and(QuizSource::analyses_document);

    let config = build_config(g, &args.doc, show_progress)
        .await?
        .question_count(args.count)
        .difficulty(args.difficulty.into())
        .question_kinds(args.kinds.iter().map(|&k| k.into()).collect())
        .build()
        .context("Invalid configuration")?;

    let (quiz, source) = if let Some(ref id) = args.from_history {
        let entry = history
            .get(id)
            .context("Failed to read history")?
            .with_context(|| format!("No history entry with id '{id}'"))?;
        let analysis = entry
            .analysis()
            .with_context(|| format!("History entry '{id}' is not an analysis"))?;
        let quiz = generate_quiz_from_analysis(&analysis, &config)
            .await
            .context("Quiz generation failed")?;
        (quiz, entry.source)
    } else {
        let quiz = match QuizSource::detect(input) {
            QuizSource::Notes => {
                let text = tokio::fs::read_to_string(input)
                    .await
                    .with_context(|| format!("Failed to read {input}"))?;
                generate_quiz(&text, &config).await
            }
            QuizSource::Analysis => {
                let data = tokio::fs::read_to_string(input)
                    .await
                    .with_context(|| format!("Failed to read {input}"))?;
                let analysis: DocumentAnalysis = serde_json::from_str(&data)
                    .with_context(|| format!("{input} is not an analysis JSON file"))?;
                generate_quiz_from_analysis(&analysis, &config).await
            }
            QuizSource::Document => {
                let analysis = analyze(input, &config).await.context("Analysis failed")?;
                record(g, history, HistoryEntry::from_analysis(&analysis));
                generate_quiz_from_analysis(&analysis, &config).await
            }
        }
        .context("Quiz generation failed")?;
        (quiz, input.to_string())
    };

    record(g, history, HistoryEntry::from_quiz(&quiz, &source));

    if let Some(ref path) = args.output {
        write_json(path, &quiz)?;
    }
    if g.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&quiz).context("Failed to serialise quiz")?
        );
    } else {
        print_quiz(&quiz, !args.no_answers);
    }
    if !g.quiet && quiz.discarded > 0 {
        eprintln!(
            "{} {} question(s) returned by the model were dropped",
            cyan("⚠"),
            quiz.discarded
        );
    }
    Ok(())
}

fn run_history(command: &HistoryCommand, g: &GlobalArgs, history: &JsonlHistoryStore) -> Result<()> {
    match command {
        HistoryCommand::List {
            kind,
            source,
            days,
            limit,
        } => {
            let filter = HistoryFilter {
                kind: kind.map(Into::into),
                source_contains: source.clone(),
                since: days.map(|d| chrono::Utc::now() - chrono::Duration::days(d)),
                limit: Some(*limit),
            };
            let entries = history.list(&filter).context("Failed to read history")?;

            if g.json {
                let rows: Vec<_> = entries
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "id": e.id,
                            "created_at": e.created_at,
                            "kind": e.kind,
                            "source": e.source,
                            "title": e.title,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if entries.is_empty() {
                eprintln!("No history in {}", history.path().display());
            } else {
                for e in entries {
                    println!(
                        "{}  {}  {:<8}  {}  {}",
                        bold(&e.id),
                        dim(&e.created_at.format("%Y-%m-%d %H:%M").to_string()),
                        e.kind.as_str(),
                        e.title,
                        dim(&e.source)
                    );
                }
            }
        }
        HistoryCommand::Show { id } => {
            let entry = history
                .get(id)
                .context("Failed to read history")?
                .with_context(|| format!("No history entry with id '{id}'"))?;
            println!("{}", serde_json::to_string_pretty(&entry.payload)?);
        }
        HistoryCommand::Export { id, output } => {
            let entry = history.export(id, output).context("Export failed")?;
            if !g.quiet {
                eprintln!(
                    "{} {} {}  →  {}",
                    green("✔"),
                    entry.kind.as_str(),
                    entry.id,
                    bold(&output.display().to_string())
                );
            }
        }
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuizSource {
    Notes,
    Analysis,
    Document,
}

impl QuizSource {
    fn detect(input: &str) -> Self {
        let ext = Path::new(input)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("txt") | Some("md") | Some("markdown") => QuizSource::Notes,
            Some("json") => QuizSource::Analysis,
            _ => QuizSource::Document,
        }
    }

    /// Only a document goes through segment analysis and its progress events.
    fn analyses_document(self) -> bool {
        self == QuizSource::Document
    }
}

/// Map CLI args to a `StudyConfigBuilder`; callers add their own settings.
async fn build_config(
    g: &GlobalArgs,
    doc: &DocumentArgs,
    show_progress: bool,
) -> Result<StudyConfigBuilder> {
    let mut builder = StudyConfig::builder()
        .max_retries(g.max_retries)
        .retry_backoff_ms(g.retry_backoff_ms)
        .request_timeout_secs(g.api_timeout)
        .download_timeout_secs(doc.download_timeout)
        .pages(parse_pages(&doc.pages)?)
        .pages_per_segment(doc.pages_per_segment)
        .min_segment_chars(doc.min_chars)
        .inter_request_delay_ms(doc.delay_ms);

    if let Some(ref key) = g.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref model) = g.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = g.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref pwd) = doc.password {
        builder = builder.password(pwd);
    }
    if let Some(ref path) = doc.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.analysis_prompt(prompt);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new_dynamic();
        builder = builder.progress_callback(cb);
    }
    Ok(builder)
}

fn history_path(g: &GlobalArgs) -> PathBuf {
    if let Some(ref p) = g.history_file {
        return p.clone();
    }
    directories::ProjectDirs::from("dev", "studyquiz", "studyquiz")
        .map(|dirs| dirs.data_dir().join("history.jsonl"))
        .unwrap_or_else(|| PathBuf::from(".studyquiz-history.jsonl"))
}

/// History is a convenience; failing to record never fails the run.
fn record(
    g: &GlobalArgs,
    history: &JsonlHistoryStore,
    entry: Result<HistoryEntry, studyquiz::StudyError>,
) {
    if g.no_history {
        return;
    }
    match entry.and_then(|e| history.append(&e)) {
        Ok(()) => {}
        Err(e) => warn!("Not recorded in history: {}", e),
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", path.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn print_analysis(a: &DocumentAnalysis) {
    println!("{}", bold(&a.display_title()));
    println!();
    for content in a.contents() {
        if !content.summary.trim().is_empty() {
            println!("{}", content.summary.trim());
            println!();
        }
    }
    if !a.key_points.is_empty() {
        println!("{}", bold("Key points"));
        for p in &a.key_points {
            println!("  • {p}");
        }
        println!();
    }
    if !a.definitions.is_empty() {
        println!("{}", bold("Definitions"));
        for d in &a.definitions {
            println!("  {}: {}", cyan(&d.term), d.definition);
        }
        println!();
    }
    if !a.exam_tips.is_empty() {
        println!("{}", bold("Exam tips"));
        for t in &a.exam_tips {
            println!("  ! {t}");
        }
        println!();
    }
    for err in a.failures() {
        eprintln!("  {} {}", red("✗"), err);
    }
}

fn print_quiz(quiz: &Quiz, with_answers: bool) {
    if let Some(ref t) = quiz.title {
        println!("{}  {}", bold(t), dim(&format!("({})", quiz.difficulty)));
        println!();
    }
    for (i, q) in quiz.questions.iter().enumerate() {
        println!("{}. {}", i + 1, q.question);
        for (j, opt) in q.options.iter().enumerate() {
            println!("   {}) {}", (b'A' + (j % 26) as u8) as char, opt);
        }
        println!();
    }
    if !with_answers {
        return;
    }
    println!("{}", bold("Answers"));
    for (i, q) in quiz.questions.iter().enumerate() {
        let label = match q.answer_index() {
            Some(j) if !q.options.is_empty() => {
                format!("{}) {}", (b'A' + (j % 26) as u8) as char, q.options[j])
            }
            _ => q.answer.clone(),
        };
        match q.explanation {
            Some(ref why) => println!("{:>3}. {}  {}", i + 1, green(&label), dim(why)),
            None => println!("{:>3}. {}", i + 1, green(&label)),
        }
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if pages.contains(&0) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1");
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
