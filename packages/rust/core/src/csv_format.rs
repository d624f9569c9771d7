//! CSV rows for the article-list and search-result exports.
//!
//! Every field is double-quoted with inner quotes doubled. The header row is
//! left unquoted and names three or four columns depending on whether the
//! match-context column is exported.

use kbscan_shared::{MatchContext, SearchMatch};

/// Header of the 3-column article export.
pub const ARTICLE_HEADER: [&str; 3] = ["Article Name", "Article URL", "Category"];

/// Header of the 4-column export with match contexts.
pub const CONTEXT_HEADER: [&str; 4] = ["Article Name", "Article URL", "Category", "Match Context"];

/// Separator between category path segments in the `Category` column.
pub const PATH_SEPARATOR: &str = " > ";

/// One CSV record whose fields are already quoted and escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow(Vec<String>);

impl CsvRow {
    /// Build a row by escaping each raw value.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(values.into_iter().map(|v| escape_field(v.as_ref())).collect())
    }

    #[cfg(test)]
    fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// The row as one line, without a line terminator.
    pub fn to_line(&self) -> String {
        self.0.join(",")
    }
}

/// Quote a field, doubling any inner double quote.
pub fn escape_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Header line for rows of `width` columns.
pub fn header_line(width: usize) -> String {
    if width == CONTEXT_HEADER.len() {
        CONTEXT_HEADER.join(",")
    } else {
        ARTICLE_HEADER.join(",")
    }
}

/// `Article Name, Article URL, Category` for the full article export.
pub fn article_row(name: &str, url: &str, category_path: &[String]) -> CsvRow {
    let category = category_path.join(PATH_SEPARATOR);
    CsvRow::from_values([name, url, category.as_str()])
}

/// One row per matching article; adds the match-context column when asked.
pub fn search_match_row(result: &SearchMatch, include_context: bool) -> CsvRow {
    let category = result.category_hierarchy.join(PATH_SEPARATOR);
    if include_context {
        CsvRow::from_values([
            result.article_title.as_str(),
            result.article_url.as_str(),
            category.as_str(),
            match_context_text(&result.matches).as_str(),
        ])
    } else {
        CsvRow::from_values([
            result.article_title.as_str(),
            result.article_url.as_str(),
            category.as_str(),
        ])
    }
}

/// Highlighted contexts, one per line, with markup entity-escaped.
pub fn match_context_text(matches: &[MatchContext]) -> String {
    matches
        .iter()
        .map(|m| html_escape::encode_quoted_attribute(&m.highlighted_context).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Header plus rows, newline separated, no trailing newline.
///
/// The header follows `include_context` so an empty document still
/// describes the columns its rows would have had.
pub fn to_csv_document(rows: &[CsvRow], include_context: bool) -> String {
    let width = if include_context {
        CONTEXT_HEADER.len()
    } else {
        ARTICLE_HEADER.len()
    };

    std::iter::once(header_line(width))
        .chain(rows.iter().map(CsvRow::to_line))
        .collect::<Vec<_>>()
        .join("\n")
}
