//! Thin client for the knowledge base's public JSON API.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use kbscan_shared::{ArticleDetail, CategoryDocument, HomeDocument, KbScanError, Result};

use crate::origin::Origin;

/// User-Agent string for upstream requests.
const USER_AGENT: &str = concat!("kbscan/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow on API calls.
const MAX_REDIRECTS: usize = 5;

/// Locale-fixed path of the tree root.
pub const HOME_PATH: &str = "/en/home.json";

/// Build the shared HTTP client used for every upstream call.
///
/// The client is stateless between calls and cheap to clone.
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| KbScanError::Network(format!("failed to build HTTP client: {e}")))
}

/// API client bound to one knowledge base origin.
#[derive(Debug, Clone)]
pub struct KbClient {
    http: Client,
    origin: Origin,
}

impl KbClient {
    pub fn new(http: Client, origin: Origin) -> Self {
        Self { http, origin }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// `GET /en/home.json`.
    pub async fn fetch_home(&self, cancel: &CancellationToken) -> Result<HomeDocument> {
        self.get_json(HOME_PATH, cancel).await
    }

    /// `GET {category.json_content_url}`.
    pub async fn fetch_category(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<CategoryDocument> {
        self.get_json(path, cancel).await
    }

    /// `GET {article.json_content_url}`.
    pub async fn fetch_article(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<ArticleDetail> {
        self.get_json(path, cancel).await
    }

    /// Fetch an origin-relative path and decode its JSON body.
    ///
    /// Fails fast with [`KbScanError::Cancelled`] if `cancel` fires before or
    /// during the request.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(KbScanError::Cancelled);
        }

        let url = self.origin.join(path);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(KbScanError::Cancelled),
            result = self.fetch_json(&url) => result,
        }
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(%url, "fetching");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| KbScanError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KbScanError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| KbScanError::Network(format!("{url}: body read failed: {e}")))?;

        serde_json::from_str(&body).map_err(|e| KbScanError::parse(format!("{url}: {e}")))
    }
}
