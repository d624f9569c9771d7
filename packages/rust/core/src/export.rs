//! CSV export of the full article list or of a search's results.

use std::pin::pin;

use futures::StreamExt;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use kbscan_crawler::{KbClient, Origin, fetch_details, walk};
use kbscan_shared::{KbScanError, ProgressEvent, Result};

use crate::csv_format::{ARTICLE_HEADER, CONTEXT_HEADER, article_row, header_line, search_match_row};
use crate::search::{SearchOptions, search_stream};

/// CSV lines, each terminated by `\n`; a fatal error arrives as the last item.
pub type LineStream = ReceiverStream<Result<String>>;

/// What to export.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub url: String,
    /// `None` (or blank) exports every article; otherwise only matches.
    /// A non-blank term is searched exactly as given, like every other search.
    pub term: Option<String>,
    /// Add the `Match Context` column to search exports.
    pub include_context: bool,
}

impl ExportRequest {
    fn search_term(&self) -> Option<&str> {
        self.term.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Start an export on a background task and return its CSV lines.
///
/// Dropping the stream cancels the export.
pub fn export_stream(
    http: Client,
    request: ExportRequest,
    opts: SearchOptions,
    cancel: CancellationToken,
) -> LineStream {
    let (tx, rx) = mpsc::channel(opts.channel_capacity.max(1));

    tokio::spawn(async move {
        let watcher = tx.clone();
        tokio::select! {
            () = run_export(http, request, opts, cancel.clone(), tx) => {}
            () = watcher.closed() => {
                debug!("export consumer went away, cancelling");
                cancel.cancel();
            }
        }
    });

    ReceiverStream::new(rx)
}

async fn run_export(
    http: Client,
    request: ExportRequest,
    opts: SearchOptions,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<String>>,
) {
    let outcome = match request.search_term() {
        Some(term) => {
            export_matches(&http, &request.url, term, request.include_context, &opts, &cancel, &tx)
                .await
        }
        None => export_articles(&http, &request.url, &opts, &cancel, &tx).await,
    };

    if let Err(e) = outcome {
        if tx.is_closed() {
            return;
        }
        match e {
            KbScanError::Cancelled => info!("export cancelled"),
            ref other => error!(error = %other, "export failed"),
        }
        let _ = tx.send(Err(e)).await;
    }
}

#[instrument(skip_all, fields(url = %url))]
async fn export_articles(
    http: &Client,
    url: &str,
    opts: &SearchOptions,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Result<String>>,
) -> Result<()> {
    let client = KbClient::new(http.clone(), Origin::resolve(url)?);
    let articles = walk(&client, cancel).await?;
    let total = articles.len();

    send_line(tx, header_line(ARTICLE_HEADER.len())).await?;

    let mut written = 0usize;
    let mut details = pin!(fetch_details(&client, articles, opts.concurrency, cancel));
    while let Some((info, detail)) = details.next().await {
        match detail {
            Ok(detail) => {
                let url = client.origin().join(&detail.content_url);
                let row = article_row(&detail.name, &url, &info.category_path);
                send_line(tx, row.to_line()).await?;
                written += 1;
            }
            Err(KbScanError::Cancelled) => return Err(KbScanError::Cancelled),
            Err(e) => warn!(
                article_id = info.article.id,
                error = %e,
                "failed to fetch article, omitting from export"
            ),
        }
    }

    info!(total, written, "article export complete");
    Ok(())
}

#[instrument(skip_all, fields(url = %url, term = %term))]
async fn export_matches(
    http: &Client,
    url: &str,
    term: &str,
    include_context: bool,
    opts: &SearchOptions,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Result<String>>,
) -> Result<()> {
    let width = if include_context {
        CONTEXT_HEADER.len()
    } else {
        ARTICLE_HEADER.len()
    };

    let mut events = search_stream(
        http.clone(),
        url.to_string(),
        term.to_string(),
        opts.clone(),
        cancel.clone(),
    );

    let mut written = 0usize;
    while let Some(event) = events.next().await {
        match event? {
            ProgressEvent::Info { .. } => send_line(tx, header_line(width)).await?,
            ProgressEvent::Result(found) => {
                send_line(tx, search_match_row(&found, include_context).to_line()).await?;
                written += 1;
            }
            ProgressEvent::Progress { .. } => {}
            ProgressEvent::Complete {
                total_processed, ..
            } => {
                info!(total_processed, written, "search export complete");
            }
        }
    }
    Ok(())
}

async fn send_line(tx: &mpsc::Sender<Result<String>>, mut line: String) -> Result<()> {
    line.push('\n');
    tx.send(Ok(line)).await.map_err(|_| KbScanError::Cancelled)
}
