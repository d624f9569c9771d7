//! Error types for kbscan.
//!
//! Library crates use [`KbScanError`] via `thiserror`.
//! The `kbscan` binary wraps this with `color-eyre` for rich diagnostics
//! and maps it onto HTTP status codes in the service.

use std::path::PathBuf;

/// Top-level error type for all kbscan operations.
#[derive(Debug, thiserror::Error)]
pub enum KbScanError {
    /// The user-supplied knowledge base URL could not be turned into an origin.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The knowledge base home document could not be fetched or parsed.
    /// Fatal for the whole operation.
    #[error("failed to fetch knowledge base home page {url}: {reason}")]
    UpstreamFetchFailed {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Upstream answered with a non-success status.
    #[error("{url}: HTTP {status}")]
    Http { url: String, status: u16 },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Malformed upstream JSON.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The operation was cancelled before it finished.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller input validation error (missing fields and the like).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KbScanError>;

impl KbScanError {
    /// Create an invalid-URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Promote a failed home-document fetch into the fatal upstream error.
    pub fn upstream(url: impl Into<String>, cause: &KbScanError) -> Self {
        let status = match cause {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        };
        Self::UpstreamFetchFailed {
            url: url.into(),
            status,
            reason: cause.to_string(),
        }
    }

    /// Whether the error was caused by bad caller input rather than upstream trouble.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. } | Self::Validation { .. })
    }
}
