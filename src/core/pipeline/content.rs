//! Content Preparation
//!
//! Assembles the single bounded text payload the extractor sees, from
//! whatever upstream produced: crawl artifacts first, then a multi-paragraph
//! search description, then the bare snippet, then caller-supplied text.
//! Truncation prefers sentence or paragraph boundaries within 10% of the
//! budget, falling back to a whitespace boundary. All budgets are measured
//! in characters.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::crawl::CrawlOutcome;
use super::search::SearchOutcome;

/// Per-page section cap within the crawl branch.
pub const SECTION_CAP: usize = 2_000;
/// Total cap for the crawl branch.
pub const CRAWL_TOTAL_CAP: usize = 12_000;
/// Cap for a multi-paragraph search description.
pub const DESCRIPTION_CAP: usize = 8_000;
/// Cap for a bare search snippet.
pub const SNIPPET_CAP: usize = 4_000;
/// Cap for caller-supplied direct text.
pub const DIRECT_TEXT_CAP: usize = 6_000;

/// Which priority branch produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    CrawlPages,
    SearchDescription,
    SearchSnippet,
    DirectText,
    Empty,
}

/// The bounded extractor input.
#[derive(Debug, Clone)]
pub struct PreparedContent {
    pub text: String,
    pub source: ContentSource,
    /// Pages contributing sections (crawl branch only).
    pub pages: usize,
}

impl PreparedContent {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Stable content hash, part of the extraction cache key.
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.text.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// The hard cap of the branch that produced this payload.
    pub fn cap(&self) -> usize {
        match self.source {
            ContentSource::CrawlPages => CRAWL_TOTAL_CAP,
            ContentSource::SearchDescription => DESCRIPTION_CAP,
            ContentSource::SearchSnippet => SNIPPET_CAP,
            ContentSource::DirectText => DIRECT_TEXT_CAP,
            ContentSource::Empty => 0,
        }
    }
}

/// Assemble the extractor payload by branch priority.
pub fn prepare(
    crawl: Option<&CrawlOutcome>,
    search: Option<&SearchOutcome>,
    direct_text: Option<&str>,
) -> PreparedContent {
    if let Some(crawl) = crawl {
        if !crawl.artifacts.is_empty() {
            return prepare_from_crawl(crawl);
        }
    }

    if let Some(search) = search {
        let description = search.description.trim();
        if !description.is_empty() {
            let multi_paragraph = description.split("\n\n").filter(|p| !p.trim().is_empty()).count() >= 2;
            return if multi_paragraph {
                PreparedContent {
                    text: truncate_to_boundary(description, DESCRIPTION_CAP),
                    source: ContentSource::SearchDescription,
                    pages: 0,
                }
            } else {
                PreparedContent {
                    text: truncate_to_boundary(description, SNIPPET_CAP),
                    source: ContentSource::SearchSnippet,
                    pages: 0,
                }
            };
        }
    }

    if let Some(direct) = direct_text {
        if !direct.trim().is_empty() {
            return PreparedContent {
                text: truncate_to_boundary(direct.trim(), DIRECT_TEXT_CAP),
                source: ContentSource::DirectText,
                pages: 0,
            };
        }
    }

    PreparedContent {
        text: String::new(),
        source: ContentSource::Empty,
        pages: 0,
    }
}

/// Crawl branch: per-page sections with source-attribution headers, each
/// bounded, total bounded.
fn prepare_from_crawl(crawl: &CrawlOutcome) -> PreparedContent {
    let mut text = String::new();
    let mut pages = 0;
    for (index, scored) in crawl.artifacts.iter().enumerate() {
        let used = text.chars().count();
        let remaining = CRAWL_TOTAL_CAP.saturating_sub(used);
        // A header plus a scrap of content is not worth a section.
        if remaining < 200 {
            break;
        }

        let artifact = &scored.artifact;
        let mut section = String::new();
        if !artifact.markdown.title.is_empty() {
            section.push_str(&artifact.markdown.title);
            section.push('\n');
        }
        section.push_str(&artifact.markdown.primary_content);
        if let Some(jsonld) = artifact.structured_data.first() {
            if let Ok(compact) = serde_json::to_string(jsonld) {
                section.push('\n');
                section.push_str(&compact);
            }
        }
        if section.trim().is_empty() {
            continue;
        }

        let header = format!("[page {}: {}]\n", index + 1, artifact.url);
        let budget = SECTION_CAP.min(remaining.saturating_sub(header.chars().count()));
        let body = truncate_to_boundary(&section, budget);
        if body.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&header);
        text.push_str(&body);
        pages += 1;
    }
    PreparedContent {
        text,
        source: ContentSource::CrawlPages,
        pages,
    }
}

/// Truncate to `budget` characters, preferring a paragraph or sentence
/// boundary within the last 10% of the budget, then any whitespace, then a
/// hard cut.
pub fn truncate_to_boundary(text: &str, budget: usize) -> String {
    if budget == 0 {
        return String::new();
    }
    let total_chars = text.chars().count();
    if total_chars <= budget {
        return text.trim_end().to_string();
    }

    let byte_budget = byte_index_of_char(text, budget);
    let window = &text[..byte_budget];
    let soft_floor = budget.saturating_sub(budget / 10);

    // Paragraph boundary first, then sentence enders; either must land in
    // the last 10% of the budget.
    let mut best: Option<usize> = window
        .rfind("\n\n")
        .map(|pos| pos + 2)
        .filter(|&end| window[..end].chars().count() >= soft_floor);
    if best.is_none() {
        for pattern in [". ", ".\n", "! ", "? "] {
            if let Some(pos) = window.rfind(pattern) {
                let end = pos + pattern.len();
                if window[..end].chars().count() >= soft_floor && best.map_or(true, |b| end > b) {
                    best = Some(end);
                }
            }
        }
    }
    if let Some(end) = best {
        return window[..end].trim_end().to_string();
    }

    // Whitespace boundary anywhere under the budget.
    if let Some(pos) = window.rfind(char::is_whitespace) {
        if pos > 0 {
            return window[..pos].trim_end().to_string();
        }
    }

    window.trim_end().to_string()
}

fn byte_index_of_char(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::crawl::ScoredArtifact;
    use crate::core::pipeline::search::LinkTier;
    use crate::core::providers::{CrawlArtifact, MarkdownContent};
    use proptest::prelude::*;

    fn crawl_with_pages(contents: &[(&str, &str)]) -> CrawlOutcome {
        let artifacts = contents
            .iter()
            .map(|(url, content)| {
                let mut artifact = CrawlArtifact::empty(*url);
                artifact.status = 200;
                artifact.markdown = MarkdownContent {
                    title: format!("Title of {url}"),
                    primary_content: content.to_string(),
                };
                ScoredArtifact {
                    artifact,
                    scored_images: Vec::new(),
                    tier: LinkTier::High,
                    from_cache: false,
                }
            })
            .collect();
        CrawlOutcome {
            artifacts,
            ..Default::default()
        }
    }

    #[test]
    fn test_crawl_branch_with_attribution_headers() {
        let crawl = crawl_with_pages(&[
            ("https://a.edu/", "About the university. Founded long ago."),
            ("https://a.edu/about", "More detail about programs."),
        ]);
        let prepared = prepare(Some(&crawl), None, None);
        assert_eq!(prepared.source, ContentSource::CrawlPages);
        assert_eq!(prepared.pages, 2);
        assert!(prepared.text.contains("[page 1: https://a.edu/]"));
        assert!(prepared.text.contains("[page 2: https://a.edu/about]"));
        assert!(prepared.text.contains("Founded long ago."));
    }

    #[test]
    fn test_crawl_sections_bounded() {
        let long = "word ".repeat(2_000);
        let crawl = crawl_with_pages(&[("https://a.edu/", &long), ("https://b.edu/", &long)]);
        let prepared = prepare(Some(&crawl), None, None);
        assert!(prepared.text.chars().count() <= CRAWL_TOTAL_CAP);
        // Each section stayed near the per-section cap, so both pages fit.
        assert_eq!(prepared.pages, 2);
    }

    #[test]
    fn test_description_branch() {
        let search = SearchOutcome {
            description: "First paragraph about the institution.\n\nSecond paragraph with more.".to_string(),
            ..Default::default()
        };
        let prepared = prepare(None, Some(&search), None);
        assert_eq!(prepared.source, ContentSource::SearchDescription);
    }

    #[test]
    fn test_snippet_branch() {
        let search = SearchOutcome {
            description: "One short snippet only.".to_string(),
            ..Default::default()
        };
        let prepared = prepare(None, Some(&search), None);
        assert_eq!(prepared.source, ContentSource::SearchSnippet);
        assert_eq!(prepared.text, "One short snippet only.");
    }

    #[test]
    fn test_direct_text_branch() {
        let prepared = prepare(None, None, Some("Caller-provided background."));
        assert_eq!(prepared.source, ContentSource::DirectText);
    }

    #[test]
    fn test_empty_branch() {
        let search = SearchOutcome::default();
        let prepared = prepare(None, Some(&search), None);
        assert_eq!(prepared.source, ContentSource::Empty);
        assert!(prepared.is_empty());
    }

    #[test]
    fn test_branch_priority_crawl_wins() {
        let crawl = crawl_with_pages(&[("https://a.edu/", "crawl text")]);
        let search = SearchOutcome {
            description: "snippet".to_string(),
            ..Default::default()
        };
        let prepared = prepare(Some(&crawl), Some(&search), Some("direct"));
        assert_eq!(prepared.source, ContentSource::CrawlPages);
    }

    #[test]
    fn test_truncate_prefers_sentence_boundary() {
        let text = format!("{} Last sentence that will be cut off entirely", "A sentence. ".repeat(100));
        let result = truncate_to_boundary(&text, 1000);
        assert!(result.chars().count() <= 1000);
        assert!(result.ends_with("A sentence."));
    }

    #[test]
    fn test_truncate_falls_back_to_whitespace() {
        let text = "word ".repeat(500);
        let result = truncate_to_boundary(&text, 999);
        assert!(result.chars().count() <= 999);
        assert!(result.ends_with("word"));
    }

    #[test]
    fn test_truncate_hard_cut_without_whitespace() {
        let text = "x".repeat(5_000);
        let result = truncate_to_boundary(&text, 100);
        assert_eq!(result.chars().count(), 100);
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let text = "é".repeat(300);
        let result = truncate_to_boundary(&text, 100);
        assert_eq!(result.chars().count(), 100);
    }

    #[test]
    fn test_content_hash_stable() {
        let a = PreparedContent {
            text: "same".to_string(),
            source: ContentSource::DirectText,
            pages: 0,
        };
        let b = PreparedContent {
            text: "same".to_string(),
            source: ContentSource::SearchSnippet,
            pages: 0,
        };
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 16);
    }

    proptest! {
        #[test]
        fn prop_truncation_respects_budget(text in "\\PC{0,4000}", budget in 1usize..2000) {
            let result = truncate_to_boundary(&text, budget);
            prop_assert!(result.chars().count() <= budget);
        }

        #[test]
        fn prop_prepared_under_hard_cap(snippet in "\\PC{0,6000}") {
            let search = SearchOutcome { description: snippet, ..Default::default() };
            let prepared = prepare(None, Some(&search), None);
            prop_assert!(prepared.text.chars().count() <= prepared.cap().max(SNIPPET_CAP));
        }
    }
}
