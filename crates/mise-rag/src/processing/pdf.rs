//! Page-wise PDF text extraction.
//!
//! Extracts each page separately and records the character span every page
//! occupies in the concatenated text, so the chunker can attribute any chunk
//! back to the page it starts on. Extraction quality is whatever the PDF
//! gives us; garbled or image-only pages simply contribute little text.

use anyhow::{Context, Result};
use lopdf::Document;
use std::path::Path;

/// Character span of one page inside the full extracted text.
#[derive(Debug, Clone, Copy)]
pub struct PageSpan {
    pub page_number: u32,
    pub start: usize,
    pub end: usize,
}

/// Full text of a manual plus the page map over it.
#[derive(Debug, Clone)]
pub struct ExtractedManual {
    pub text: String,
    pub pages: Vec<PageSpan>,
}

impl ExtractedManual {
    /// The page a character position falls on. Positions in the inter-page
    /// markers resolve to the following page; out-of-range positions fall
    /// back to page 1.
    pub fn page_for_offset(&self, offset: usize) -> u32 {
        self.pages
            .iter()
            .find(|span| offset < span.end)
            .map(|span| span.page_number)
            .unwrap_or_else(|| self.pages.last().map(|s| s.page_number).unwrap_or(1))
    }
}

/// Extract all pages of a PDF, preserving page boundaries.
pub fn extract_manual(path: &Path) -> Result<ExtractedManual> {
    let doc = Document::load(path)
        .with_context(|| format!("failed to load PDF {}", path.display()))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut text = String::new();
    let mut pages = Vec::with_capacity(page_numbers.len());

    for (i, &page_number) in page_numbers.iter().enumerate() {
        let start = text.len();
        let page_text = doc
            .extract_text(&[page_number])
            .unwrap_or_default()
            .replace('\u{0}', "");

        text.push_str(&format!("\n\n--- Page {} ---\n\n", i + 1));
        text.push_str(page_text.trim());

        pages.push(PageSpan {
            page_number: (i + 1) as u32,
            start,
            end: text.len(),
        });
    }

    tracing::debug!(
        path = %path.display(),
        pages = pages.len(),
        chars = text.len(),
        "extracted manual text"
    );

    Ok(ExtractedManual { text, pages })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_with_pages(pages: &[(&str, u32)]) -> ExtractedManual {
        let mut text = String::new();
        let mut spans = Vec::new();
        for &(content, page_number) in pages {
            let start = text.len();
            text.push_str(content);
            spans.push(PageSpan {
                page_number,
                start,
                end: text.len(),
            });
        }
        ExtractedManual { text, pages: spans }
    }

    #[test]
    fn offsets_resolve_to_their_page() {
        let first = "a".repeat(100);
        let second = "b".repeat(100);
        let manual = manual_with_pages(&[(first.as_str(), 1), (second.as_str(), 2)]);
        assert_eq!(manual.page_for_offset(0), 1);
        assert_eq!(manual.page_for_offset(99), 1);
        assert_eq!(manual.page_for_offset(100), 2);
        assert_eq!(manual.page_for_offset(150), 2);
    }

    #[test]
    fn out_of_range_offsets_fall_back_to_the_last_page() {
        let manual = manual_with_pages(&[("hello", 1), ("world", 2)]);
        assert_eq!(manual.page_for_offset(10_000), 2);
    }
}
