//! Search-term matching inside rendered article HTML.
//!
//! An article body is segmented by heading. Every heading whose text contains
//! the term, and every sentence of body text that contains it, becomes a
//! [`MatchContext`] carrying the nearest heading and a highlighted rendering.
//!
//! Attribution rules:
//! - a match inside a heading is attributed to the *previous* heading;
//! - body text is attributed to the heading that precedes it;
//! - text before the first heading is not searched when the document has
//!   headings; a document without headings is searched whole with an empty
//!   heading.
//!
//! Matching is case-insensitive and literal. An empty term matches nothing.

mod segment;

use regex::Regex;
use tracing::trace;

use kbscan_shared::{KbScanError, MatchContext, Result};

/// Opening highlight marker.
pub const HIGHLIGHT_OPEN: &str = "<mark>";

/// Closing highlight marker.
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// A compiled search term, reusable across articles.
#[derive(Debug, Clone)]
pub struct Matcher {
    /// `None` for the empty term.
    pattern: Option<Regex>,
}

impl Matcher {
    /// Compile `term` for case-insensitive literal matching.
    pub fn new(term: &str) -> Result<Self> {
        if term.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = Regex::new(&format!("(?i){}", regex::escape(term)))
            .map_err(|e| KbScanError::validation(format!("unusable search term: {e}")))?;

        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Whether `text` contains the term.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Wrap every occurrence of the term in the highlight markers.
    pub fn highlight(&self, text: &str) -> String {
        match &self.pattern {
            Some(re) => re
                .replace_all(text, |caps: &regex::Captures<'_>| {
                    format!("{HIGHLIGHT_OPEN}{}{HIGHLIGHT_CLOSE}", &caps[0])
                })
                .into_owned(),
            None => text.to_string(),
        }
    }

    /// Extract all match contexts from an article's HTML.
    pub fn extract(&self, html: &str) -> Vec<MatchContext> {
        let mut matches = Vec::new();
        if self.pattern.is_none() {
            return matches;
        }

        let headings = segment::find_headings(html);
        if headings.is_empty() {
            self.scan_span(html, "", &mut matches);
            return matches;
        }

        let mut active_heading = String::new();
        let mut previous_end: Option<usize> = None;

        for heading in &headings {
            let text = segment::heading_text(heading.inner);

            if self.is_match(&text) {
                matches.push(self.context(&active_heading, &text));
            }

            if let Some(end) = previous_end {
                self.scan_span(&html[end..heading.start], &active_heading, &mut matches);
            }

            active_heading = text;
            previous_end = Some(heading.end);
        }

        if let Some(end) = previous_end {
            if end < html.len() {
                self.scan_span(&html[end..], &active_heading, &mut matches);
            }
        }

        trace!(
            headings = headings.len(),
            matches = matches.len(),
            "extracted matches"
        );
        matches
    }

    /// Search the sentences of one heading-delimited span.
    fn scan_span(&self, span_html: &str, heading: &str, out: &mut Vec<MatchContext>) {
        let text = segment::span_text(span_html);

        for sentence in segment::split_sentences(&text) {
            let sentence = sentence.trim();
            if self.is_match(sentence) {
                out.push(self.context(heading, sentence));
            }
        }
    }

    fn context(&self, heading: &str, text: &str) -> MatchContext {
        let text = text.trim();
        MatchContext {
            heading: heading.to_string(),
            context: text.to_string(),
            highlighted_context: self.highlight(text),
        }
    }
}

/// One-shot convenience: compile `term` and extract matches from `html`.
pub fn extract_matches(html: &str, term: &str) -> Result<Vec<MatchContext>> {
    Ok(Matcher::new(term)?.extract(html))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Remove the highlight markers, recovering the plain context.
    fn strip_highlight(text: &str) -> String {
        text.replace(HIGHLIGHT_OPEN, "").replace(HIGHLIGHT_CLOSE, "")
    }

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn sentence_under_heading() {
        let html = "<h1>Intro</h1><p>This mentions apple once.</p><h2>Next</h2><p>No fruit here.</p>";
        let matches = extract_matches(html, "apple").unwrap();

        assert_eq!(
            matches,
            vec![MatchContext {
                heading: "Intro".into(),
                context: "This mentions apple once.".into(),
                highlighted_context: "This mentions <mark>apple</mark> once.".into(),
            }]
        );
    }

    #[test]
    fn heading_match_attributes_to_previous_heading() {
        // Known quirk kept for downstream consumers: the heading that contains
        // the term is reported under the heading before it.
        let html = "<h1>Setup</h1><p>Install it.</p><h2>Apple devices</h2><p>Works on apple silicon.</p>";
        let matches = extract_matches(html, "apple").unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].heading, "Setup");
        assert_eq!(matches[0].context, "Apple devices");
        assert_eq!(matches[0].highlighted_context, "<mark>Apple</mark> devices");
        assert_eq!(matches[1].heading, "Apple devices");
        assert_eq!(matches[1].context, "Works on apple silicon.");
    }

    #[test]
    fn first_heading_match_has_empty_heading() {
        let matches = extract_matches("<h2>Apple pie</h2><p>Bake.</p>", "apple").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].heading, "");
    }

    #[test]
    fn heading_match_precedes_the_span_before_it() {
        // The heading's own match is emitted before the sentences of the span
        // that ends at that heading.
        let html = "<h1>A</h1><p>pear one.</p><h2>pear two</h2>";
        let matches = extract_matches(html, "pear").unwrap();
        let contexts: Vec<_> = matches.iter().map(|m| m.context.as_str()).collect();
        assert_eq!(contexts, vec!["pear two", "pear one."]);
    }

    #[test]
    fn text_before_first_heading_is_not_searched() {
        let html = "<p>apple before.</p><h1>Title</h1><p>apple after.</p>";
        let matches = extract_matches(html, "apple").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].context, "apple after.");
        assert_eq!(matches[0].heading, "Title");
    }

    #[test]
    fn no_headings_searches_whole_document() {
        let html = "<div><p>Apple one. Banana two.</p><p>Another APPLE!</p></div>";
        let matches = extract_matches(html, "apple").unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.heading.is_empty()));
        assert_eq!(matches[1].context, "Another APPLE!");
        assert_eq!(matches[1].highlighted_context, "Another <mark>APPLE</mark>!");
    }

    #[test]
    fn every_occurrence_is_highlighted() {
        let matcher = Matcher::new("ab").unwrap();
        assert_eq!(
            matcher.highlight("Ab ab xAB abab"),
            "<mark>Ab</mark> <mark>ab</mark> x<mark>AB</mark> <mark>ab</mark><mark>ab</mark>"
        );
    }

    #[test]
    fn highlight_changes_nothing_else() {
        let matcher = Matcher::new("plan").unwrap();
        let text = "Plans & pricing: the Plan (monthly) vs. annual plan.";
        let highlighted = matcher.highlight(text);
        assert_eq!(strip_highlight(&highlighted), text);
        assert_eq!(highlighted.matches(HIGHLIGHT_OPEN).count(), 3);
    }

    #[test]
    fn term_is_matched_literally() {
        let html = "<p>Costs $5.00 (approx). Costs $5X00 otherwise.</p>";
        let matches = extract_matches(html, "$5.00 (").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].highlighted_context,
            "Costs <mark>$5.00 (</mark>approx)."
        );
    }

    #[test]
    fn empty_term_matches_nothing() {
        let html = "<h1>Intro</h1><p>Anything at all.</p>";
        assert!(extract_matches(html, "").unwrap().is_empty());

        let matcher = Matcher::new("").unwrap();
        assert!(!matcher.is_match("text"));
        assert_eq!(matcher.highlight("text"), "text");
    }

    #[test]
    fn empty_html_yields_nothing() {
        assert!(extract_matches("", "apple").unwrap().is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = load_fixture("article.html");
        let matcher = Matcher::new("invoice").unwrap();
        assert_eq!(matcher.extract(&html), matcher.extract(&html));
    }

    #[test]
    fn fixture_article_matches() {
        let html = load_fixture("article.html");
        let matches = extract_matches(&html, "invoice").unwrap();

        let summary: Vec<(&str, &str)> = matches
            .iter()
            .map(|m| (m.heading.as_str(), m.context.as_str()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (
                    "Billing overview",
                    "Updating the invoice address"
                ),
                (
                    "Billing overview",
                    "Your invoice is emailed to the account owner."
                ),
                (
                    "Billing overview",
                    "Copies of every Invoice are kept for seven years."
                ),
                (
                    "Updating the invoice address",
                    "The change applies to the next invoice?"
                ),
            ]
        );
        assert_eq!(
            matches[2].highlighted_context,
            "Copies of every <mark>Invoice</mark> are kept for seven years."
        );
    }
}
