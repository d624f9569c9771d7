//! Knowledge base URL → origin normalization.

use std::fmt;

use url::Url;

use kbscan_shared::{KbScanError, Result};

/// Scheme + host (+ explicit port) of a knowledge base.
///
/// Every upstream API path is appended to this prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    /// Resolve a user-supplied URL to its origin, discarding path and query.
    pub fn resolve(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| KbScanError::invalid_url(raw, e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(KbScanError::invalid_url(
                    raw,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| KbScanError::invalid_url(raw, "URL has no host"))?;

        let origin = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };

        Ok(Self(origin))
    }

    /// Append an origin-relative API path (`/en/home.json`, `/en/articles/1.json`).
    pub fn join(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.0)
        } else {
            format!("{}/{path}", self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_discards_path_and_query() {
        let origin = Origin::resolve("https://help.example.com/en/categories/12?x=1#top").unwrap();
        assert_eq!(origin.as_str(), "https://help.example.com");
    }

    #[test]
    fn resolve_keeps_explicit_port() {
        let origin = Origin::resolve("http://localhost:3000/docs").unwrap();
        assert_eq!(origin.as_str(), "http://localhost:3000");
    }

    #[test]
    fn resolve_drops_default_port() {
        let origin = Origin::resolve("https://help.example.com:443/").unwrap();
        assert_eq!(origin.as_str(), "https://help.example.com");
    }

    #[test]
    fn resolve_rejects_relative_url() {
        let err = Origin::resolve("help.example.com/en").unwrap_err();
        assert!(matches!(err, KbScanError::InvalidUrl { .. }));
    }

    #[test]
    fn resolve_rejects_non_http_scheme() {
        let err = Origin::resolve("ftp://help.example.com").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));

        assert!(Origin::resolve("mailto:support@example.com").is_err());
    }

    #[test]
    fn join_handles_leading_slash() {
        let origin = Origin::resolve("https://kb.example.com").unwrap();
        assert_eq!(
            origin.join("/en/home.json"),
            "https://kb.example.com/en/home.json"
        );
        assert_eq!(
            origin.join("en/home.json"),
            "https://kb.example.com/en/home.json"
        );
    }
}
