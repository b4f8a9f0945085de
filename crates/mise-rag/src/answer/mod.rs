//! Answer Assembly
//!
//! Owns citation formatting from retrieved metadata. The prose itself comes
//! from the external generation collaborator; this module turns the passages
//! it was grounded on into a reference section, and extracts numbered
//! follow-up options so chat frontends can expand a bare "2" into the full
//! option text.

pub mod prompts;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::types::RetrievedPassage;

static NUMBERED_OPTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?m)^\s*(\d+)\.\s*(\S[^\n]*)$").expect("numbered option regex is valid")
});

/// Build a reference section from the top passages, grouped by manual title
/// with deduplicated page numbers. Passages without both a title and a page
/// number are excluded; returns `None` when nothing qualifies; an answer
/// without references is legal.
pub fn build_references(passages: &[RetrievedPassage], max_sources: usize) -> Option<String> {
    // BTreeMap keeps manuals in title order and page sets sorted.
    let mut manual_pages: BTreeMap<&str, Vec<u32>> = BTreeMap::new();

    for passage in passages.iter().take(max_sources) {
        let (Some(title), Some(page)) = (
            passage.metadata.title.as_deref(),
            passage.metadata.page_number,
        ) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }

        let pages = manual_pages.entry(title).or_default();
        if !pages.contains(&page) {
            pages.push(page);
        }
    }

    if manual_pages.is_empty() {
        return None;
    }

    let parts: Vec<String> = manual_pages
        .into_iter()
        .map(|(title, mut pages)| {
            pages.sort_unstable();
            format!("{}, {}", title, format_pages(&pages))
        })
        .collect();

    let reference = if parts.len() == 1 {
        format!("\n\n**Reference:** {}", parts[0])
    } else {
        let mut section = String::from("\n\n**References:**\n");
        for part in parts {
            section.push_str(&format!("- {}\n", part));
        }
        section
    };

    Some(reference)
}

/// Format a sorted, deduplicated page list.
///
/// One page → "Page N". Up to five pages → a comma list, whether or not they
/// are consecutive. More than five consecutive pages → a range. More than
/// five scattered pages → the first three plus a count of the rest.
fn format_pages(pages: &[u32]) -> String {
    match pages {
        [only] => format!("Page {}", only),
        [first, second] => format!("Pages {}, {}", first, second),
        _ if pages.len() <= 5 => format!("Pages {}", join_pages(pages)),
        _ => {
            let consecutive = pages.windows(2).all(|w| w[0] + 1 == w[1]);
            if consecutive {
                format!("Pages {}-{}", pages[0], pages[pages.len() - 1])
            } else {
                format!(
                    "Pages {}, and {} more",
                    join_pages(&pages[..3]),
                    pages.len() - 3
                )
            }
        }
    }
}

fn join_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pull numbered options ("1. Descaling the boiler") out of a generated
/// answer. The chat layer stores these so a bare numeric reply on the next
/// turn can be expanded back into the full option text.
pub fn extract_followup_options(answer: &str) -> Vec<String> {
    NUMBERED_OPTION_RE
        .captures_iter(answer)
        .map(|cap| cap[2].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PassageMetadata;

    fn passage(title: Option<&str>, page: Option<u32>) -> RetrievedPassage {
        RetrievedPassage {
            content: "text".to_string(),
            score: 0.8,
            metadata: PassageMetadata {
                title: title.map(str::to_string),
                page_number: page,
                ..PassageMetadata::default()
            },
        }
    }

    #[test]
    fn single_page_single_manual() {
        let passages = vec![passage(Some("Coffee Maker Manual"), Some(12))];
        let refs = build_references(&passages, 5).unwrap();
        assert_eq!(refs, "\n\n**Reference:** Coffee Maker Manual, Page 12");
    }

    #[test]
    fn two_pages_are_listed() {
        let passages = vec![
            passage(Some("Coffee Maker Manual"), Some(12)),
            passage(Some("Coffee Maker Manual"), Some(9)),
        ];
        let refs = build_references(&passages, 5).unwrap();
        assert!(refs.contains("Pages 9, 12"));
    }

    #[test]
    fn exactly_five_pages_render_as_comma_list_even_when_consecutive() {
        let passages: Vec<_> = [3u32, 4, 5, 6, 7]
            .iter()
            .map(|&p| passage(Some("X"), Some(p)))
            .collect();
        let refs = build_references(&passages, 5).unwrap();
        assert!(refs.contains("Pages 3, 4, 5, 6, 7"));
        assert!(!refs.contains('-'), "five pages must never render as a range");
    }

    #[test]
    fn five_scattered_pages_render_as_comma_list() {
        let passages: Vec<_> = [3u32, 4, 5, 6, 9]
            .iter()
            .map(|&p| passage(Some("X"), Some(p)))
            .collect();
        let refs = build_references(&passages, 5).unwrap();
        assert!(refs.contains("Pages 3, 4, 5, 6, 9"));
    }

    #[test]
    fn six_consecutive_pages_render_as_a_range() {
        let passages: Vec<_> = [3u32, 4, 5, 6, 7, 8]
            .iter()
            .map(|&p| passage(Some("X"), Some(p)))
            .collect();
        let refs = build_references(&passages, 6).unwrap();
        assert!(refs.contains("Pages 3-8"));
    }

    #[test]
    fn six_scattered_pages_render_as_first_three_plus_count() {
        let passages: Vec<_> = [3u32, 4, 5, 6, 9, 14]
            .iter()
            .map(|&p| passage(Some("X"), Some(p)))
            .collect();
        let refs = build_references(&passages, 6).unwrap();
        assert!(refs.contains("Pages 3, 4, 5, and 3 more"));
    }

    #[test]
    fn duplicate_pages_collapse() {
        let passages = vec![
            passage(Some("X"), Some(3)),
            passage(Some("X"), Some(3)),
            passage(Some("X"), Some(4)),
        ];
        let refs = build_references(&passages, 5).unwrap();
        assert!(refs.contains("Pages 3, 4"));
    }

    #[test]
    fn multiple_manuals_become_a_bulleted_list() {
        let passages = vec![
            passage(Some("Vulcan Manual"), Some(2)),
            passage(Some("Coffee Maker Manual"), Some(7)),
        ];
        let refs = build_references(&passages, 5).unwrap();
        assert!(refs.starts_with("\n\n**References:**\n"));
        assert!(refs.contains("- Coffee Maker Manual, Page 7"));
        assert!(refs.contains("- Vulcan Manual, Page 2"));
    }

    #[test]
    fn passages_without_title_or_page_are_excluded() {
        let passages = vec![
            passage(None, Some(3)),
            passage(Some("X"), None),
            passage(None, None),
        ];
        assert!(build_references(&passages, 5).is_none());
    }

    #[test]
    fn only_the_top_passages_are_cited() {
        let mut passages: Vec<_> = (1..=5).map(|p| passage(Some("X"), Some(p))).collect();
        passages.push(passage(Some("Other Manual"), Some(99)));
        let refs = build_references(&passages, 5).unwrap();
        assert!(!refs.contains("Other Manual"));
    }

    #[test]
    fn numbered_options_are_extracted() {
        let answer = "Sure! Which would you like help with?\n\
                      1. Descaling the boiler\n\
                      2. Resetting the dry-boil protection\n\
                      3. Cleaning the carafe\n\
                      Just reply with 1, 2 or 3";
        let options = extract_followup_options(answer);
        assert_eq!(options.len(), 3);
        assert_eq!(options[1], "Resetting the dry-boil protection");
    }

    #[test]
    fn answers_without_options_extract_nothing() {
        assert!(extract_followup_options("Step one: turn it off.").is_empty());
    }
}
