//! Depth-first flattening of the knowledge base tree.
//!
//! The walk starts at `/en/home.json`, descends into categories (one fetch
//! each) and sections (children inline), and records every article with the
//! display names of its ancestors. Output order is tree pre-order.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use kbscan_shared::{ArticlePathInfo, ContentNode, KbScanError, Result};

use crate::client::{HOME_PATH, KbClient};

/// Counters gathered while walking, logged once at the end.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub categories_fetched: usize,
    pub categories_skipped: usize,
    pub sections: usize,
    pub ignored_nodes: usize,
}

/// Flatten the whole tree into articles with category paths.
///
/// A failed home fetch is fatal ([`KbScanError::UpstreamFetchFailed`]); a
/// failed category fetch only prunes that branch.
#[instrument(skip_all, fields(origin = %client.origin()))]
pub async fn walk(client: &KbClient, cancel: &CancellationToken) -> Result<Vec<ArticlePathInfo>> {
    let (articles, _) = walk_with_stats(client, cancel).await?;
    Ok(articles)
}

/// Like [`walk`], also returning the traversal counters.
pub async fn walk_with_stats(
    client: &KbClient,
    cancel: &CancellationToken,
) -> Result<(Vec<ArticlePathInfo>, WalkStats)> {
    let started = Instant::now();

    let home = match client.fetch_home(cancel).await {
        Ok(home) => home,
        Err(KbScanError::Cancelled) => return Err(KbScanError::Cancelled),
        Err(e) => return Err(KbScanError::upstream(client.origin().join(HOME_PATH), &e)),
    };

    let mut articles = Vec::new();
    let mut stats = WalkStats::default();

    // Each frame is a content array still being consumed plus the path of its owner.
    let mut stack: Vec<(std::vec::IntoIter<ContentNode>, Vec<String>)> =
        vec![(home.content.into_iter(), vec![home.name])];

    while let Some((nodes, path)) = stack.last_mut() {
        let Some(node) = nodes.next() else {
            stack.pop();
            continue;
        };

        match node {
            ContentNode::Article(article) => {
                articles.push(ArticlePathInfo {
                    article,
                    category_path: path.clone(),
                });
            }
            ContentNode::Section(section) => {
                stats.sections += 1;
                let mut child_path = path.clone();
                child_path.push(section.name);
                stack.push((section.content.into_iter(), child_path));
            }
            ContentNode::Category(category) => {
                let parent_path = path.clone();
                match client.fetch_category(&category.json_content_url, cancel).await {
                    Ok(doc) => {
                        stats.categories_fetched += 1;
                        let mut child_path = parent_path;
                        child_path.push(doc.name);
                        stack.push((doc.content.into_iter(), child_path));
                    }
                    Err(KbScanError::Cancelled) => return Err(KbScanError::Cancelled),
                    Err(e) => {
                        stats.categories_skipped += 1;
                        warn!(
                            category_id = category.id,
                            category = %category.name,
                            error = %e,
                            "failed to fetch category, skipping branch"
                        );
                    }
                }
            }
            ContentNode::ResourceLink(link) => {
                stats.ignored_nodes += 1;
                debug!(link = %link.link, "skipping resource link");
            }
            ContentNode::Unsupported => {
                stats.ignored_nodes += 1;
                debug!("skipping unsupported content node");
            }
        }
    }

    info!(
        articles = articles.len(),
        categories = stats.categories_fetched,
        categories_skipped = stats.categories_skipped,
        duration_ms = started.elapsed().as_millis(),
        "knowledge base walk complete"
    );

    Ok((articles, stats))
}
