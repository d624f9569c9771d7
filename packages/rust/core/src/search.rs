//! Search orchestration: walk the tree, fetch each article, extract matches.
//!
//! One event loop backs every consumer. [`search_stream`] hands the events to
//! a transport as they happen; [`search`] drains the same loop into a list of
//! [`SearchMatch`]es.

use std::pin::pin;

use futures::StreamExt;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use kbscan_crawler::{KbClient, Origin, fetch_details, walk};
use kbscan_matcher::Matcher;
use kbscan_shared::{KbScanError, ProgressEvent, Result, ScanConfig, SearchMatch};

/// Events buffered between the search task and a slow consumer.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Stream of search events; a fatal error arrives as the last item.
pub type EventStream = ReceiverStream<Result<ProgressEvent>>;

/// Tuning knobs for one search run.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Article detail requests in flight (1 = strictly sequential).
    pub concurrency: usize,
    /// Emit `progress` every N processed articles (and on the last one).
    pub progress_interval: usize,
    /// Bounded channel size between producer and consumer.
    pub channel_capacity: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for SearchOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1) as usize,
            progress_interval: config.progress_interval.max(1) as usize,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Run a search and collect every matching article, in traversal order.
///
/// Fails without partial results on any fatal error.
#[instrument(skip_all, fields(url = %url, term = %term))]
pub async fn search(
    http: &Client,
    url: &str,
    term: &str,
    opts: &SearchOptions,
    cancel: &CancellationToken,
) -> Result<Vec<SearchMatch>> {
    let (tx, mut rx) = mpsc::channel(opts.channel_capacity.max(1));

    let producer = run_search(
        http.clone(),
        url.to_string(),
        term.to_string(),
        opts.clone(),
        cancel.clone(),
        tx,
    );

    let consumer = async move {
        let mut results = Vec::new();
        while let Some(item) = rx.recv().await {
            if let ProgressEvent::Result(found) = item? {
                results.push(found);
            }
        }
        Ok::<_, KbScanError>(results)
    };

    let ((), results) = tokio::join!(producer, consumer);
    results
}

/// Start a search on a background task and return its event stream.
///
/// Dropping the stream cancels the search: in-flight upstream requests are
/// abandoned and no further fetches are issued.
pub fn search_stream(
    http: Client,
    url: String,
    term: String,
    opts: SearchOptions,
    cancel: CancellationToken,
) -> EventStream {
    let (tx, rx) = mpsc::channel(opts.channel_capacity.max(1));

    tokio::spawn(async move {
        let watcher = tx.clone();
        tokio::select! {
            () = run_search(http, url, term, opts, cancel.clone(), tx) => {}
            () = watcher.closed() => {
                debug!("search consumer went away, cancelling");
                cancel.cancel();
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Drive one search, reporting a fatal error as the final stream item.
async fn run_search(
    http: Client,
    url: String,
    term: String,
    opts: SearchOptions,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<ProgressEvent>>,
) {
    if let Err(e) = drive(&http, &url, &term, &opts, &cancel, &tx).await {
        if tx.is_closed() {
            debug!(error = %e, "search stopped after consumer left");
            return;
        }
        match e {
            KbScanError::Cancelled => info!("search cancelled"),
            ref other => error!(error = %other, "search failed"),
        }
        let _ = tx.send(Err(e)).await;
    }
}

#[instrument(skip_all, fields(url = %url, term = %term))]
async fn drive(
    http: &Client,
    url: &str,
    term: &str,
    opts: &SearchOptions,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Result<ProgressEvent>>,
) -> Result<()> {
    let origin = Origin::resolve(url)?;
    let matcher = Matcher::new(term)?;
    let client = KbClient::new(http.clone(), origin);

    let articles = walk(&client, cancel).await?;
    let total = articles.len();
    let interval = opts.progress_interval.max(1);

    emit(tx, ProgressEvent::Info {
        total_articles: total,
    })
    .await?;

    let mut processed = 0usize;
    let mut found = 0usize;
    let mut details = pin!(fetch_details(&client, articles, opts.concurrency, cancel));

    while let Some((info, detail)) = details.next().await {
        match detail {
            Ok(detail) => {
                let matches = matcher.extract(&detail.html_content);
                if !matches.is_empty() {
                    found += 1;
                    debug!(
                        article_id = info.article.id,
                        matches = matches.len(),
                        "article matched"
                    );
                    emit(
                        tx,
                        ProgressEvent::Result(SearchMatch {
                            article_id: info.article.id,
                            article_title: detail.name,
                            article_url: client.origin().join(&detail.content_url),
                            category_hierarchy: info.category_path,
                            matches,
                        }),
                    )
                    .await?;
                }
            }
            Err(KbScanError::Cancelled) => return Err(KbScanError::Cancelled),
            Err(e) => {
                warn!(
                    article_id = info.article.id,
                    error = %e,
                    "failed to fetch article, counting as processed"
                );
            }
        }

        processed += 1;
        if processed % interval == 0 || processed == total {
            emit(tx, ProgressEvent::Progress {
                processed,
                found,
                total,
            })
            .await?;
        }
    }

    emit(tx, ProgressEvent::Complete {
        total_found: found,
        total_processed: processed,
    })
    .await?;

    info!(
        total,
        processed,
        found,
        "search complete"
    );
    Ok(())
}

/// Push one event; a closed channel means the consumer is gone.
async fn emit(tx: &mpsc::Sender<Result<ProgressEvent>>, event: ProgressEvent) -> Result<()> {
    tx.send(Ok(event))
        .await
        .map_err(|_| KbScanError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article_node(id: u64) -> serde_json::Value {
        json!({
            "type": "article",
            "id": id,
            "name": format!("Article {id}"),
            "content_url": format!("/en/articles/{id}"),
            "json_content_url": format!("/en/articles/{id}.json"),
        })
    }

    async fn mount_home(server: &MockServer, content: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/en/home.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "home",
                "name": "Home",
                "content": content,
            })))
            .mount(server)
            .await;
    }

    async fn mount_article(server: &MockServer, id: u64, html: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/en/articles/{id}.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "name": format!("Title {id}"),
                "content_url": format!("/en/articles/{id}-slug"),
                "html_content": html,
                "text_content": "",
            })))
            .mount(server)
            .await;
    }

    fn http() -> Client {
        kbscan_crawler::build_http_client(5).unwrap()
    }

    fn opts(concurrency: usize, progress_interval: usize) -> SearchOptions {
        SearchOptions {
            concurrency,
            progress_interval,
            channel_capacity: 8,
        }
    }

    async fn collect_events(stream: EventStream) -> Vec<Result<ProgressEvent>> {
        stream.collect().await
    }

    /// Assert the ordering and counter invariants of a finished stream.
    fn assert_well_formed(events: &[ProgressEvent]) {
        assert!(matches!(events.first(), Some(ProgressEvent::Info { .. })));
        assert!(matches!(events.last(), Some(ProgressEvent::Complete { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ProgressEvent::Info { .. }))
                .count(),
            1
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ProgressEvent::Complete { .. }))
                .count(),
            1
        );

        let ProgressEvent::Info { total_articles } = events[0] else {
            unreachable!()
        };
        let mut results_seen = 0;
        let mut last_processed = 0;
        let mut reached_total = 0;
        for event in events {
            match event {
                ProgressEvent::Result(_) => results_seen += 1,
                ProgressEvent::Progress {
                    processed,
                    found,
                    total,
                } => {
                    assert!(*processed >= last_processed);
                    assert_eq!(*found, results_seen);
                    assert_eq!(*total, total_articles);
                    if *processed == total_articles {
                        reached_total += 1;
                    }
                    last_processed = *processed;
                }
                ProgressEvent::Complete {
                    total_found,
                    total_processed,
                } => {
                    assert_eq!(*total_found, results_seen);
                    assert_eq!(*total_processed, total_articles);
                }
                ProgressEvent::Info { .. } => {}
            }
        }
        if total_articles > 0 {
            assert_eq!(reached_total, 1);
        }
    }

    #[tokio::test]
    async fn batch_search_collects_matches() {
        let server = MockServer::start().await;
        mount_home(&server, vec![article_node(1), article_node(2)]).await;
        mount_article(
            &server,
            1,
            "<h1>Intro</h1><p>This mentions apple once.</p><h2>Next</h2><p>No fruit here.</p>",
        )
        .await;
        mount_article(&server, 2, "<p>Nothing relevant.</p>").await;

        let results = search(
            &http(),
            &format!("{}/en/home", server.uri()),
            "apple",
            &opts(1, 25),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.article_id, 1);
        assert_eq!(hit.article_title, "Title 1");
        assert_eq!(hit.article_url, format!("{}/en/articles/1-slug", server.uri()));
        assert_eq!(hit.category_hierarchy, vec!["Home"]);
        assert_eq!(hit.matches[0].heading, "Intro");
        assert_eq!(
            hit.matches[0].highlighted_context,
            "This mentions <mark>apple</mark> once."
        );
    }

    #[tokio::test]
    async fn stream_is_well_formed_with_cadence() {
        let server = MockServer::start().await;
        let ids: Vec<u64> = (1..=7).collect();
        mount_home(&server, ids.iter().map(|id| article_node(*id)).collect()).await;
        for id in &ids {
            let html = if id % 2 == 0 {
                "<p>Has the needle.</p>"
            } else {
                "<p>Plain hay.</p>"
            };
            mount_article(&server, *id, html).await;
        }

        let events: Vec<ProgressEvent> = collect_events(search_stream(
            http(),
            server.uri(),
            "needle".into(),
            opts(3, 3),
            CancellationToken::new(),
        ))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

        assert_well_formed(&events);

        let progress: Vec<(usize, usize)> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress {
                    processed, found, ..
                } => Some((*processed, *found)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(3, 1), (6, 3), (7, 3)]);

        let result_ids: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Result(m) => Some(m.article_id),
                _ => None,
            })
            .collect();
        assert_eq!(result_ids, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn failed_article_counts_as_processed() {
        let server = MockServer::start().await;
        mount_home(&server, vec![article_node(1), article_node(2), article_node(3)]).await;
        mount_article(&server, 1, "<p>needle one.</p>").await;
        Mock::given(method("GET"))
            .and(path("/en/articles/2.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_article(&server, 3, "<p>needle three.</p>").await;

        let events: Vec<ProgressEvent> = collect_events(search_stream(
            http(),
            server.uri(),
            "needle".into(),
            opts(2, 25),
            CancellationToken::new(),
        ))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

        assert_well_formed(&events);
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Complete {
                total_found: 2,
                total_processed: 3
            })
        );
    }

    #[tokio::test]
    async fn empty_tree_still_completes() {
        let server = MockServer::start().await;
        mount_home(&server, vec![]).await;

        let events: Vec<ProgressEvent> = collect_events(search_stream(
            http(),
            server.uri(),
            "anything".into(),
            opts(1, 25),
            CancellationToken::new(),
        ))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

        assert_eq!(
            events,
            vec![
                ProgressEvent::Info { total_articles: 0 },
                ProgressEvent::Complete {
                    total_found: 0,
                    total_processed: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn home_failure_ends_stream_with_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/en/home.json"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let events = collect_events(search_stream(
            http(),
            server.uri(),
            "x".into(),
            opts(1, 25),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Err(KbScanError::UpstreamFetchFailed {
                status: Some(502),
                ..
            })
        ));

        let err = search(
            &http(),
            &server.uri(),
            "x",
            &opts(1, 25),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KbScanError::UpstreamFetchFailed { .. }));
    }

    #[tokio::test]
    async fn invalid_url_fails_before_any_request() {
        let err = search(
            &http(),
            "not a url",
            "x",
            &opts(1, 25),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KbScanError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn dropping_stream_stops_fetching() {
        let server = MockServer::start().await;
        let ids: Vec<u64> = (1..=20).collect();
        mount_home(&server, ids.iter().map(|id| article_node(*id)).collect()).await;
        for id in &ids {
            Mock::given(method("GET"))
                .and(path(format!("/en/articles/{id}.json")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_delay(Duration::from_millis(200))
                        .set_body_json(json!({
                            "id": id,
                            "name": "slow",
                            "content_url": "/en/articles/slow",
                            "html_content": "<p>needle.</p>",
                            "text_content": "",
                        })),
                )
                .mount(&server)
                .await;
        }

        let cancel = CancellationToken::new();
        let mut stream = search_stream(
            http(),
            server.uri(),
            "needle".into(),
            opts(1, 25),
            cancel.clone(),
        );

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, ProgressEvent::Info { total_articles: 20 });
        drop(stream);

        tokio::time::timeout(Duration::from_secs(2), cancel.cancelled())
            .await
            .expect("search should cancel once the stream is dropped");

        tokio::time::sleep(Duration::from_millis(300)).await;
        let requests = server.received_requests().await.unwrap();
        let article_requests = requests
            .iter()
            .filter(|r| r.url.path().starts_with("/en/articles/"))
            .count();
        assert!(article_requests < ids.len());
    }

    #[tokio::test]
    async fn cancelled_token_reports_cancellation() {
        let server = MockServer::start().await;
        mount_home(&server, vec![article_node(1)]).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = search(&http(), &server.uri(), "x", &opts(1, 25), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, KbScanError::Cancelled));
    }
}
