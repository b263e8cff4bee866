//! History of past analyses and quizzes.
//!
//! Each run is appended as one JSON object per line. The file is never
//! rewritten; a line that no longer parses (truncated write, manual edit) is
//! skipped with a warning so one bad record cannot hide the rest.

use crate::error::StudyError;
use crate::output::{DocumentAnalysis, Quiz};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

/// What a history entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Analysis,
    Quiz,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Analysis => "analysis",
            EntryKind::Quiz => "quiz",
        }
    }
}

/// One recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub kind: EntryKind,
    /// Path or URL the run was based on.
    pub source: String,
    pub title: String,
    /// The full [`DocumentAnalysis`] or [`Quiz`] as JSON.
    pub payload: Value,
}

static SEQ: AtomicU32 = AtomicU32::new(0);

impl HistoryEntry {
    pub fn new(
        kind: EntryKind,
        source: impl Into<String>,
        title: impl Into<String>,
        payload: Value,
    ) -> Self {
        let created_at = Utc::now();
        let seq = SEQ.fetch_add(1, Ordering::Relaxed) % 1000;
        Self {
            // Timestamp alone collides across processes writing the same file.
            id: format!(
                "{}-{}-{:03}",
                created_at.format("%Y%m%d%H%M%S%3f"),
                std::process::id(),
                seq
            ),
            created_at,
            kind,
            source: source.into(),
            title: title.into(),
            payload,
        }
    }

    pub fn from_analysis(analysis: &DocumentAnalysis) -> Result<Self, StudyError> {
        let payload = serde_json::to_value(analysis)
            .map_err(|e| StudyError::Internal(format!("serialise analysis: {e}")))?;
        Ok(Self::new(
            EntryKind::Analysis,
            &analysis.source,
            analysis.display_title(),
            payload,
        ))
    }

    pub fn from_quiz(quiz: &Quiz, source: &str) -> Result<Self, StudyError> {
        let payload = serde_json::to_value(quiz)
            .map_err(|e| StudyError::Internal(format!("serialise quiz: {e}")))?;
        let title = quiz
            .title
            .clone()
            .unwrap_or_else(|| format!("{} quiz", quiz.difficulty));
        Ok(Self::new(EntryKind::Quiz, source, title, payload))
    }

    /// Decode the payload of an analysis entry.
    pub fn analysis(&self) -> Option<DocumentAnalysis> {
        match self.kind {
            EntryKind::Analysis => serde_json::from_value(self.payload.clone()).ok(),
            EntryKind::Quiz => None,
        }
    }
}

/// Selection criteria for [`HistoryStore::list`]. Empty filter = everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<EntryKind>,
    /// Case-insensitive substring of `source`.
    pub source_contains: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        if let Some(ref needle) = self.source_contains {
            if !entry
                .source
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.created_at < since {
                return false;
            }
        }
        true
    }
}

pub trait HistoryStore: Send + Sync {
    fn append(&self, entry: &HistoryEntry) -> Result<(), StudyError>;

    /// Matching entries, newest first.
    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, StudyError>;

    fn get(&self, id: &str) -> Result<Option<HistoryEntry>, StudyError>;

    /// Write an entry's payload as pretty JSON to `path`.
    fn export(&self, id: &str, path: &Path) -> Result<HistoryEntry, StudyError> {
        let entry = self
            .get(id)?
            .ok_or_else(|| StudyError::InvalidRequest(format!("no history entry with id '{id}'")))?;
        let json = serde_json::to_string_pretty(&entry.payload)
            .map_err(|e| StudyError::Internal(format!("serialise payload: {e}")))?;
        std::fs::write(path, json).map_err(|e| StudyError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(entry)
    }
}

/// JSON-lines file store.
#[derive(Debug)]
pub struct JsonlHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, detail: impl std::fmt::Display) -> StudyError {
        StudyError::History {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn read_all(&self) -> Result<Vec<HistoryEntry>, StudyError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.err(e)),
        };

        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("{}:{}: unreadable history line skipped: {}", self.path.display(), n + 1, e),
            }
        }
        Ok(entries)
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn append(&self, entry: &HistoryEntry) -> Result<(), StudyError> {
        let mut line = serde_json::to_string(entry).map_err(|e| self.err(e))?;
        line.push('\n');

        let _guard = self.write_lock.lock().map_err(|_| self.err("write lock poisoned"))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.err(e))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.err(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.err(e))?;
        debug!("History: recorded {} {}", entry.kind.as_str(), entry.id);
        Ok(())
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, StudyError> {
        let mut entries: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        // Stable sort keeps append order among equal timestamps; reverse for newest first.
        entries.sort_by_key(|e| e.created_at);
        entries.reverse();
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    fn get(&self, id: &str) -> Result<Option<HistoryEntry>, StudyError> {
        Ok(self.read_all()?.into_iter().find(|e| e.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry(kind: EntryKind, source: &str, age_days: i64) -> HistoryEntry {
        let mut e = HistoryEntry::new(kind, source, "t", json!({"source": source}));
        e.created_at = Utc::now() - Duration::days(age_days);
        e
    }

    #[test]
    fn missing_file_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path().join("history.jsonl"));
        assert!(store.list(&HistoryFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn list_is_newest_first_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path().join("sub/history.jsonl"));
        store.append(&entry(EntryKind::Analysis, "bio.pdf", 3)).unwrap();
        store.append(&entry(EntryKind::Quiz, "bio.pdf", 1)).unwrap();
        store.append(&entry(EntryKind::Analysis, "Chem.PDF", 0)).unwrap();

        let all = store.list(&HistoryFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].source, "Chem.PDF");
        assert_eq!(all[2].source, "bio.pdf");

        let analyses = store
            .list(&HistoryFilter {
                kind: Some(EntryKind::Analysis),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(analyses.len(), 2);

        let chem = store
            .list(&HistoryFilter {
                source_contains: Some("chem".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(chem.len(), 1);

        let recent = store
            .list(&HistoryFilter {
                since: Some(Utc::now() - Duration::days(2)),
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].source, "Chem.PDF");
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = JsonlHistoryStore::new(&path);
        let e = entry(EntryKind::Quiz, "notes.txt", 0);
        store.append(&e).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"id\": truncated\n").unwrap();

        let all = store.list(&HistoryFilter::default()).unwrap();
        assert_eq!(all, vec![e]);
    }

    #[test]
    fn export_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path().join("history.jsonl"));
        let e = entry(EntryKind::Analysis, "bio.pdf", 0);
        store.append(&e).unwrap();

        let out = dir.path().join("export.json");
        store.export(&e.id, &out).unwrap();
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written, json!({"source": "bio.pdf"}));

        assert!(store.export("nope", &out).is_err());
    }

    #[test]
    fn ids_are_unique_within_a_millisecond() {
        let a = HistoryEntry::new(EntryKind::Quiz, "s", "t", Value::Null);
        let b = HistoryEntry::new(EntryKind::Quiz, "s", "t", Value::Null);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn ids_carry_the_process_id() {
        let e = HistoryEntry::new(EntryKind::Analysis, "s", "t", Value::Null);
        let parts: Vec<&str> = e.id.split('-').collect();
        assert_eq!(parts.len(), 3, "got: {}", e.id);
        assert_eq!(parts[0].len(), 17);
        assert_eq!(parts[1], std::process::id().to_string());
        assert_eq!(parts[2].len(), 3);
    }
}
