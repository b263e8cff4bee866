//! PDF text extraction via pdfium.
//!
//! pdfium keeps thread-local state and blocks, so every call runs inside
//! `tokio::task::spawn_blocking`. Only the text layer is read; pages without
//! one (scans) come back empty and are later skipped by the batch
//! orchestrator's minimum-length check.

use crate::config::PageSelection;
use crate::error::StudyError;
use crate::output::DocumentMetadata;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Text of one PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    pub text: String,
}

/// Extract the text of the selected pages, in page order.
pub async fn extract_pages(
    pdf_path: &Path,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<Vec<PageText>, StudyError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(|s| s.to_string());
    let selection = selection.clone();

    tokio::task::spawn_blocking(move || {
        extract_pages_blocking(&path, password.as_deref(), &selection)
    })
    .await
    .map_err(|e| StudyError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Read document metadata without touching page content.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, StudyError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| StudyError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, StudyError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| StudyError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn open_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> StudyError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            StudyError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            StudyError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        StudyError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn extract_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<Vec<PageText>, StudyError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(StudyError::PageOutOfRange {
            page: first_requested_page(selection),
            total: total_pages,
        });
    }

    let mut results = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| StudyError::TextExtractionFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                // One unreadable text layer should not sink the document.
                warn!("Page {}: no text layer ({:?})", idx + 1, e);
                String::new()
            }
        };
        debug!("Page {}: {} chars", idx + 1, text.chars().count());

        results.push(PageText {
            page_num: idx + 1,
            text,
        });
    }

    Ok(results)
}

fn first_requested_page(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, StudyError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
        source: PathBuf::from(pdf_path).display().to_string(),
    })
}
