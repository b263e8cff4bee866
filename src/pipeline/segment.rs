//! Group extracted pages into segments: one segment = one model call.

use crate::pipeline::extract::PageText;
use serde::{Deserialize, Serialize};

/// One or more consecutive pages sent to the model together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSegment {
    /// 1-indexed position in the batch.
    pub index: usize,
    pub first_page: usize,
    pub last_page: usize,
    pub text: String,
    /// Trimmed characters of page text, page markers excluded.
    #[serde(default)]
    pub content_chars: usize,
}

impl PageSegment {
    /// A segment whose whole `text` is page content.
    pub fn new(index: usize, first_page: usize, last_page: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let content_chars = text.trim().chars().count();
        Self {
            index,
            first_page,
            last_page,
            text,
            content_chars,
        }
    }

    /// `"4"` or `"4-6"`.
    pub fn page_label(&self) -> String {
        if self.first_page == self.last_page {
            self.first_page.to_string()
        } else {
            format!("{}-{}", self.first_page, self.last_page)
        }
    }

    /// Characters of meaningful page text; drives the minimum-length skip.
    pub fn content_len(&self) -> usize {
        self.content_chars
    }
}

/// Chunk `pages` into segments of `pages_per_segment`, truncating each
/// segment's text to `max_chars` characters.
///
/// Multi-page segments label each page so the model can cite page numbers.
pub fn segment_pages(pages: &[PageText], pages_per_segment: usize, max_chars: usize) -> Vec<PageSegment> {
    pages
        .chunks(pages_per_segment.max(1))
        .enumerate()
        .map(|(i, chunk)| {
            let text = if chunk.len() == 1 {
                chunk[0].text.clone()
            } else {
                chunk
                    .iter()
                    .map(|p| format!("--- Page {} ---\n{}", p.page_num, p.text.trim()))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            };
            let content_chars: usize = chunk.iter().map(|p| p.text.trim().chars().count()).sum();
            PageSegment {
                index: i + 1,
                first_page: chunk[0].page_num,
                last_page: chunk[chunk.len() - 1].page_num,
                text: truncate_chars(&text, max_chars),
                content_chars: content_chars.min(max_chars),
            }
        })
        .collect()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, text: &str) -> PageText {
        PageText {
            page_num: n,
            text: text.to_string(),
        }
    }

    #[test]
    fn one_page_per_segment() {
        let pages = vec![page(1, "a"), page(2, "b"), page(3, "c")];
        let segs = segment_pages(&pages, 1, 100);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[2].index, 3);
        assert_eq!(segs[2].page_label(), "3");
        assert_eq!(segs[1].text, "b");
    }

    #[test]
    fn chunks_keep_page_markers_and_remainder() {
        let pages = vec![page(2, "a"), page(3, "b"), page(4, "c")];
        let segs = segment_pages(&pages, 2, 1000);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].page_label(), "2-3");
        assert!(segs[0].text.contains("--- Page 3 ---\nb"));
        assert_eq!(segs[1].page_label(), "4");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let pages = vec![page(1, "ééééé")];
        let segs = segment_pages(&pages, 1, 3);
        assert_eq!(segs[0].text, "ééé");
    }

    #[test]
    fn content_len_ignores_whitespace() {
        let seg = PageSegment::new(1, 1, 1, "   ab  \n\n");
        assert_eq!(seg.content_len(), 2);
    }

    #[test]
    fn page_markers_do_not_count_as_content() {
        let pages = vec![page(1, "   "), page(2, ""), page(3, "\n"), page(4, " ")];
        let segs = segment_pages(&pages, 4, 1000);
        assert_eq!(segs.len(), 1);
        assert!(segs[0].text.contains("--- Page 4 ---"));
        assert_eq!(segs[0].content_len(), 0);

        let pages = vec![page(1, " abc "), page(2, "de")];
        assert_eq!(segment_pages(&pages, 2, 1000)[0].content_len(), 5);
    }

    #[test]
    fn empty_input_gives_no_segments() {
        assert!(segment_pages(&[], 3, 10).is_empty());
    }
}
