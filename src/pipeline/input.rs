//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! pdfium needs a file-system path, so URLs are downloaded into a `TempDir`
//! that lives as long as the [`ResolvedInput`]. The file's magic bytes decide
//! whether it is analysed as a PDF or as an image; the extension is ignored.

use crate::error::StudyError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// What kind of document an input is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Pdf,
    Png,
    Jpeg,
}

impl InputKind {
    /// Detect the kind from the first bytes of a file.
    pub fn sniff(magic: &[u8]) -> Option<Self> {
        if magic.starts_with(b"%PDF") {
            Some(InputKind::Pdf)
        } else if magic.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(InputKind::Png)
        } else if magic.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(InputKind::Jpeg)
        } else {
            None
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, InputKind::Png | InputKind::Jpeg)
    }
}

/// A local file ready for analysis.
pub struct ResolvedInput {
    path: PathBuf,
    kind: InputKind,
    /// The string the user passed in; used for history and error messages.
    source_name: String,
    /// Keeps a downloaded file alive until analysis completes.
    _temp_dir: Option<TempDir>,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local, typed file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, StudyError> {
    if input.trim().is_empty() {
        return Err(StudyError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Write in-memory bytes to a temp file and resolve it.
pub fn resolve_bytes(bytes: &[u8], source_name: &str) -> Result<ResolvedInput, StudyError> {
    let kind = sniff_bytes(bytes, source_name)?;
    let temp_dir = TempDir::new().map_err(|e| StudyError::Internal(format!("tempdir: {e}")))?;
    let path = temp_dir.path().join(default_filename(kind));
    std::fs::write(&path, bytes)
        .map_err(|e| StudyError::Internal(format!("Failed to write temp file: {e}")))?;

    Ok(ResolvedInput {
        path,
        kind,
        source_name: source_name.to_string(),
        _temp_dir: Some(temp_dir),
    })
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, StudyError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(StudyError::FileNotFound { path });
    }

    let mut magic = [0u8; 4];
    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let n = f.read(&mut magic).unwrap_or(0);
            if n < magic.len() {
                return Err(StudyError::UnsupportedFormat {
                    source_name: path_str.to_string(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(StudyError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(StudyError::FileNotFound { path });
        }
    }

    let kind = sniff_bytes(&magic, path_str)?;
    debug!("Resolved local {:?}: {}", kind, path.display());

    Ok(ResolvedInput {
        path,
        kind,
        source_name: path_str.to_string(),
        _temp_dir: None,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, StudyError> {
    info!("Downloading: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StudyError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            StudyError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            StudyError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(StudyError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| StudyError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let kind = sniff_bytes(&bytes, url)?;
    let filename = filename_from_url(url).unwrap_or_else(|| default_filename(kind).to_string());

    let temp_dir = TempDir::new().map_err(|e| StudyError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| StudyError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());

    Ok(ResolvedInput {
        path,
        kind,
        source_name: url.to_string(),
        _temp_dir: Some(temp_dir),
    })
}

fn sniff_bytes(bytes: &[u8], source_name: &str) -> Result<InputKind, StudyError> {
    InputKind::sniff(bytes).ok_or_else(|| {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        StudyError::UnsupportedFormat {
            source_name: source_name.to_string(),
            magic,
        }
    })
}

fn default_filename(kind: InputKind) -> &'static str {
    match kind {
        InputKind::Pdf => "input.pdf",
        InputKind::Png => "input.png",
        InputKind::Jpeg => "input.jpg",
    }
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniff_known_formats() {
        assert_eq!(InputKind::sniff(b"%PDF-1.7"), Some(InputKind::Pdf));
        assert_eq!(InputKind::sniff(&[0x89, b'P', b'N', b'G', 0x0D]), Some(InputKind::Png));
        assert_eq!(InputKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(InputKind::Jpeg));
        assert_eq!(InputKind::sniff(b"GIF8"), None);
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://x.test/notes/ch1.pdf").as_deref(),
            Some("ch1.pdf")
        );
        assert_eq!(filename_from_url("https://x.test/download"), None);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.err().unwrap();
        assert!(matches!(err, StudyError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn text_file_is_unsupported() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5).await.err().unwrap();
        assert!(matches!(err, StudyError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn local_pdf_is_detected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.4\n%...").unwrap();
        let resolved = resolve_input(f.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.kind(), InputKind::Pdf);
    }

    #[test]
    fn bytes_are_written_to_a_temp_file() {
        let resolved = resolve_bytes(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0], "upload").unwrap();
        assert_eq!(resolved.kind(), InputKind::Jpeg);
        assert!(resolved.path().exists());
        assert_eq!(resolved.source_name(), "upload");
    }
}
