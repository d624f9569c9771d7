//! Shared types, error model, and configuration for kbscan.
//!
//! This crate is the foundation depended on by all other kbscan crates.
//! It provides:
//! - [`KbScanError`] — the unified error type
//! - Knowledge-base wire types ([`ContentNode`], [`HomeDocument`], [`ArticleDetail`])
//! - Search result types ([`ArticlePathInfo`], [`MatchContext`], [`SearchMatch`], [`ProgressEvent`])
//! - Configuration ([`AppConfig`], [`ScanConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, ScanConfig, SearchConfig, ServerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{KbScanError, Result};
pub use types::{
    ArticleDetail, ArticleNode, ArticlePathInfo, CategoryDocument, CategoryNode, ContentNode,
    HomeDocument, MatchContext, ProgressEvent, ResourceLinkNode, SearchMatch, SectionNode,
};
