//! Link extraction for Markdown note bodies
//!
//! Recognizes two link forms:
//! - Wiki links: `[[TARGET]]`, `[[TARGET|alias]]`, `[[TARGET#section]]`
//! - Inline links: `[text](TARGET)`
//!
//! Targets are returned verbatim; the caller decides what counts as a
//! note reference. Image embeds (`![alt](target)`) and URL targets
//! (`scheme://...`) are not note links and are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The kind of syntax a link target was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Wiki,
    Markdown,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Wiki => "wiki",
            LinkKind::Markdown => "markdown",
        }
    }
}

/// Link targets extracted from a body, de-duplicated in
/// first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLinks {
    /// Targets that appeared as `[[...]]`
    pub wiki: Vec<String>,
    /// Targets that appeared as `[text](...)`
    pub markdown: Vec<String>,
    /// Union of both, in first-occurrence order across the whole body
    pub all: Vec<String>,
}

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!?)\[[^\]]*\]\(([^)\s]+)\)").unwrap());

/// Extract all link targets from a Markdown body.
///
/// Wiki links take the text before `|` (alias) and before `#`
/// (header/block fragment). Inline links take the parenthesized
/// target. Both lists and the combined `all` list preserve
/// first-occurrence order with duplicates removed.
pub fn extract_links(body: &str) -> ExtractedLinks {
    let mut links = ExtractedLinks::default();
    let mut seen_all = std::collections::HashSet::new();
    let mut seen_wiki = std::collections::HashSet::new();
    let mut seen_md = std::collections::HashSet::new();

    for (kind, target) in scan_links(body) {
        match kind {
            LinkKind::Wiki => {
                if seen_wiki.insert(target.clone()) {
                    links.wiki.push(target.clone());
                }
            }
            LinkKind::Markdown => {
                if seen_md.insert(target.clone()) {
                    links.markdown.push(target.clone());
                }
            }
        }
        if seen_all.insert(target.clone()) {
            links.all.push(target);
        }
    }

    links
}

/// Scan a body for link occurrences in document order.
///
/// Wiki links are found with a character scan (they may contain `]`
/// only as the closing pair); inline links with a compiled regex.
/// Results are merged by byte offset so `all` reflects true
/// first-occurrence order.
fn scan_links(body: &str) -> Vec<(LinkKind, String)> {
    let mut found: Vec<(usize, LinkKind, String)> = Vec::new();

    for (offset, target) in scan_wiki_links(body) {
        found.push((offset, LinkKind::Wiki, target));
    }

    for caps in MARKDOWN_LINK.captures_iter(body) {
        // Leading `!` marks an image embed
        if &caps[1] == "!" {
            continue;
        }
        let target = caps[2].trim();
        if target.is_empty() || target.contains("://") {
            continue;
        }
        let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
        found.push((offset, LinkKind::Markdown, target.to_string()));
    }

    found.sort_by_key(|(offset, _, _)| *offset);
    found
        .into_iter()
        .map(|(_, kind, target)| (kind, target))
        .collect()
}

/// Find `[[...]]` spans and return (byte offset, target) pairs.
fn scan_wiki_links(body: &str) -> Vec<(usize, String)> {
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'[' && bytes[i + 1] == b'[' {
            let start = i + 2;
            if let Some(close) = find_closing(bytes, start) {
                let inner = &body[start..close];
                if let Some(target) = wiki_target(inner) {
                    out.push((i, target));
                }
                i = close + 2;
                continue;
            }
        }
        i += 1;
    }

    out
}

/// Position of the `]]` that closes a span opened at `start`.
fn find_closing(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i + 1 < bytes.len() {
        if bytes[i] == b']' && bytes[i + 1] == b']' {
            return Some(i);
        }
        // Wiki links do not span lines
        if bytes[i] == b'\n' {
            return None;
        }
        i += 1;
    }
    None
}

/// Reduce the inside of a wiki link to its target: text before `|`
/// and before any `#` fragment, trimmed.
fn wiki_target(inner: &str) -> Option<String> {
    let before_alias = inner.split('|').next().unwrap_or(inner);
    let before_fragment = before_alias.split('#').next().unwrap_or(before_alias);
    let target = before_fragment.trim();
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_wiki_and_markdown_in_order() {
        let body = "see [[A]] and [text](B) and [[A|x]]";
        let links = extract_links(body);

        assert_eq!(links.all, vec!["A", "B"]);
        assert_eq!(links.wiki, vec!["A"]);
        assert_eq!(links.markdown, vec!["B"]);
    }

    #[test]
    fn wiki_alias_takes_text_before_pipe() {
        let links = extract_links("[[Note Name|Display Text]]");
        assert_eq!(links.wiki, vec!["Note Name"]);
    }

    #[test]
    fn wiki_fragment_is_stripped() {
        let links = extract_links("[[Note#Header Section]] [[Other#^block-1]]");
        assert_eq!(links.wiki, vec!["Note", "Other"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let links = extract_links("[[B]] then [[A]] then [[B]] then [a](A)");
        assert_eq!(links.all, vec!["B", "A"]);
        assert_eq!(links.wiki, vec!["B", "A"]);
        assert_eq!(links.markdown, vec!["A"]);
    }

    #[test]
    fn image_embeds_are_skipped() {
        let links = extract_links("![diagram](assets/diagram.png) and [doc](Readme)");
        assert_eq!(links.markdown, vec!["Readme"]);
    }

    #[test]
    fn url_targets_are_skipped() {
        let links = extract_links("[site](https://example.com) [note](20240101T000000000001Z)");
        assert_eq!(links.markdown, vec!["20240101T000000000001Z"]);
    }

    #[test]
    fn unclosed_wiki_link_is_ignored() {
        let links = extract_links("broken [[Note and more text\n[[Real]]");
        assert_eq!(links.wiki, vec!["Real"]);
    }

    #[test]
    fn empty_target_is_ignored()  {
        let links = extract_links("[[]] [[ ]] [x]()");
        assert!(links.all.is_empty());
    }

    #[test]
    fn multiple_links_on_one_line() {
        let links = extract_links("See [[Note1]] and [[Note2]] for details");
        assert_eq!(links.wiki, vec!["Note1", "Note2"]);
    }

    #[test]
    fn no_links_returns_empty() {
        let links = extract_links("Just some text with no links");
        assert!(links.all.is_empty());
        assert!(links.wiki.is_empty());
        assert!(links.markdown.is_empty());
    }
}
