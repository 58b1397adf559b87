use anyhow::{Context, Result, bail};
use regex::Regex;

/// Recorded in place of an identifier when no token follows the keyword
/// within the window. Absence is a normal outcome, not an error.
pub(crate) const ABSENT_ID: &str = "N/A";

/// Case-insensitive keyword search with a bounded identifier window.
pub(crate) struct KeywordMatcher {
    keyword: Regex,
    id_pattern: Regex,
    id_window: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeywordHit {
    pub extracted_id: Option<String>,
}

impl KeywordMatcher {
    pub fn new(keyword: &str, id_window: usize) -> Result<Self> {
        if keyword.trim().is_empty() {
            bail!("keyword must not be empty");
        }

        let keyword = Regex::new(&format!("(?i){}", regex::escape(keyword)))
            .context("failed to compile keyword pattern")?;
        // Identifier: alphanumeric run, optionally joined by - or _.
        // Separators are preserved exactly as they appear on the page.
        let id_pattern = Regex::new(r"[A-Za-z0-9]+(?:[-_][A-Za-z0-9]+)*")
            .context("failed to compile identifier pattern")?;

        Ok(Self {
            keyword,
            id_pattern,
            id_window,
        })
    }

    /// Only the first keyword occurrence per page is used for extraction;
    /// later occurrences on the same page are ignored.
    pub fn find_match(&self, page_text: &str) -> Option<KeywordHit> {
        let hit = self.keyword.find(page_text)?;
        let tail = &page_text[hit.end()..];
        let window = clamp_to_window(tail, self.id_window);

        let extracted_id = self
            .id_pattern
            .find(window)
            .map(|token| token.as_str().to_string());

        Some(KeywordHit { extracted_id })
    }
}

/// The identifier search never scans past the window boundary; a token that
/// straddles the boundary is truncated at it.
fn clamp_to_window(tail: &str, window: usize) -> &str {
    match tail.char_indices().nth(window) {
        Some((boundary, _)) => &tail[..boundary],
        None => tail,
    }
}
