//! Bounded, order-preserving article detail fetching.

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use kbscan_shared::{ArticleDetail, ArticlePathInfo, Result};

use crate::client::KbClient;

/// Fetch the detail document of every article with at most `concurrency`
/// requests in flight.
///
/// Items come back in the order of `articles` regardless of completion
/// order. A failed fetch is yielded as an `Err` next to its article and
/// never affects its siblings.
pub fn fetch_details<'a>(
    client: &'a KbClient,
    articles: Vec<ArticlePathInfo>,
    concurrency: usize,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = (ArticlePathInfo, Result<ArticleDetail>)> + Send + 'a {
    stream::iter(articles)
        .map(move |info| async move {
            let detail = client
                .fetch_article(&info.article.json_content_url, cancel)
                .await;
            (info, detail)
        })
        .buffered(concurrency.max(1))
}
