//! Lightweight HTML segmentation: heading discovery, tag stripping, and
//! sentence splitting.
//!
//! This is a regex heuristic over the raw markup, not a DOM parse. Article
//! bodies from the knowledge base are small, well-formed fragments, and the
//! match attribution rules depend on byte spans of the original HTML.

use std::sync::LazyLock;

use regex::Regex;

/// A heading tag located in the source HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeadingSpan<'a> {
    /// Byte offset of the opening `<hN`.
    pub start: usize,
    /// Byte offset just past the closing `</hN>`.
    pub end: usize,
    /// Raw inner HTML between the tags.
    pub inner: &'a str,
}

// ---------------------------------------------------------------------------
// Headings
// ---------------------------------------------------------------------------

static HEADING_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h([1-6])(?:\s[^>]*)?>").expect("valid regex"));

// One closer per level; the regex crate has no backreferences.
static HEADING_CLOSE_RES: LazyLock<[Regex; 6]> = LazyLock::new(|| {
    std::array::from_fn(|i| {
        Regex::new(&format!(r"(?i)</h{}\s*>", i + 1)).expect("valid regex")
    })
});

/// Find every `<hN ...>...</hN>` pair in document order.
///
/// An opening tag without a closing tag of the same level is skipped.
pub(crate) fn find_headings(html: &str) -> Vec<HeadingSpan<'_>> {
    let mut headings = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = HEADING_OPEN_RE.captures_at(html, cursor) {
        let (Some(open), Some(level)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let level_idx = usize::from(level.as_str().as_bytes()[0] - b'1');

        match HEADING_CLOSE_RES[level_idx].find_at(html, open.end()) {
            Some(close) => {
                headings.push(HeadingSpan {
                    start: open.start(),
                    end: close.end(),
                    inner: &html[open.end()..close.start()],
                });
                cursor = close.end();
            }
            None => cursor = open.end(),
        }
    }

    headings
}

/// Plain text of a heading: nested markup removed, whitespace collapsed.
pub(crate) fn heading_text(inner: &str) -> String {
    collapse_whitespace(&strip_tags(inner, "")).trim().to_string()
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Replace every tag with `replacement`.
pub(crate) fn strip_tags(html: &str, replacement: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

    TAG_RE.replace_all(html, replacement).into_owned()
}

/// Collapse each whitespace run into a single space.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    WS_RE.replace_all(text, " ").into_owned()
}

/// Markup-free, whitespace-normalized text of an HTML span.
pub(crate) fn span_text(html: &str) -> String {
    collapse_whitespace(&strip_tags(html, " "))
}

/// Split at whitespace that follows `.`, `!` or `?`.
///
/// The terminal punctuation stays with its sentence and the whitespace run is
/// dropped. Pieces are not trimmed.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            sentences.push(&text[start..idx]);

            let mut resume = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                resume = next_idx + next.len_utf8();
                chars.next();
            }
            start = resume;
            prev = None;
            continue;
        }
        prev = Some(ch);
    }

    sentences.push(&text[start..]);
    sentences
}
