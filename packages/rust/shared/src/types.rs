//! Core domain types for kbscan.
//!
//! The knowledge-base types mirror the vendor's public JSON API; the search
//! types are what the orchestrators emit and what the transports serialize.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Knowledge base tree
// ---------------------------------------------------------------------------

/// One entry of a `content` array in the knowledge base tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentNode {
    /// Terminal content; its detail document holds the HTML body.
    Article(ArticleNode),
    /// Requires a fetch of `json_content_url` to see its children.
    Category(CategoryNode),
    /// Children are embedded inline.
    Section(SectionNode),
    /// External link, never traversed.
    ResourceLink(ResourceLinkNode),
    /// Any node type this version does not know about.
    #[serde(other)]
    Unsupported,
}

/// An `article` node as it appears inside a content array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleNode {
    pub id: u64,
    pub name: String,
    /// Human-facing page path.
    pub content_url: String,
    /// Path of the JSON detail document.
    pub json_content_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slim_content_url: Option<String>,
}

/// A `category` node; its content lives behind `json_content_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: u64,
    pub name: String,
    pub content_url: String,
    pub json_content_url: String,
}

/// A `section` node with its children inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionNode {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub content: Vec<ContentNode>,
}

/// A `resource_link` node pointing outside the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLinkNode {
    pub id: u64,
    pub name: String,
    pub link: String,
}

/// `GET /en/home.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_content_url: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentNode>,
}

/// `GET {category.json_content_url}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDocument {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_content_url: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentNode>,
}

/// `GET {article.json_content_url}` — fetched lazily, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDetail {
    pub id: u64,
    pub name: String,
    /// Canonical page path, relative to the origin.
    pub content_url: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub text_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_category_id: Option<u64>,
}

/// An article plus the display names of its ancestors, root first.
///
/// The path never includes the article's own name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticlePathInfo {
    #[serde(flatten)]
    pub article: ArticleNode,
    #[serde(rename = "categoryPath")]
    pub category_path: Vec<String>,
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// One sentence- or heading-level excerpt containing the search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchContext {
    /// Nearest preceding heading, empty when none was seen yet.
    pub heading: String,
    pub context: String,
    /// `context` with every occurrence of the term wrapped in `<mark>`.
    pub highlighted_context: String,
}

/// All matches found in a single article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub article_id: u64,
    pub article_title: String,
    pub article_url: String,
    pub category_hierarchy: Vec<String>,
    pub matches: Vec<MatchContext>,
}

/// Events of a streaming search, serialized as `{"type": ..., "data": ...}`.
///
/// A well-formed stream is one `Info`, any number of `Result`/`Progress`,
/// then one `Complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Info { total_articles: usize },
    Result(SearchMatch),
    Progress {
        processed: usize,
        found: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        total_found: usize,
        total_processed: usize,
    },
}

impl ProgressEvent {
    /// The wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::Result(_) => "result",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
        }
    }
}
