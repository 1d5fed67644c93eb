//! Pulls posts from a source until enough of them have something to download.

use crate::error::ResolveError;
use crate::pipeline::post::Post;
use crate::plugins::http::fetch::HttpFetcher;
use crate::plugins::registry::ResolverRegistry;
use crate::source::PostSource;
use chrono::{Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info};

/// Posts requested per page, relative to what is still missing. Many saved
/// posts resolve to nothing, so asking for exactly the remainder wastes pages.
pub const OVERFETCH_FACTOR: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub min_score: Option<i64>,
    pub max_age: Option<Duration>,
}

impl PostFilter {
    pub fn accepts(&self, post: &Post) -> bool {
        if !post.score_at_least(self.min_score) {
            return false;
        }
        match self.max_age {
            Some(age) => Utc::now() - post.created() <= age,
            None => true,
        }
    }
}

#[derive(Debug)]
pub enum SkipReason {
    NoMatch,
    Filtered,
    Failed(ResolveError),
    /// Resolved fine, but the page brought in more posts than the batch needs.
    OverQuota,
}

#[derive(Debug)]
pub struct SkippedPost {
    pub post: Post,
    pub reason: SkipReason,
}

/// Posts with at least one resolved url, plus everything passed over on the way.
#[derive(Debug, Default)]
pub struct Batch {
    pub posts: Vec<Post>,
    pub skipped: Vec<SkippedPost>,
}

pub async fn collect_batch(
    source: &mut dyn PostSource,
    amount: usize,
    filter: &PostFilter,
    registry: &ResolverRegistry,
    fetcher: &HttpFetcher,
) -> anyhow::Result<Batch> {
    if amount < 1 {
        anyhow::bail!("batch size must be at least 1, got {amount}");
    }

    let mut batch = Batch::default();
    while batch.posts.len() < amount {
        let want = (amount - batch.posts.len()) * OVERFETCH_FACTOR;
        let page = source.next_page(want).await?;
        if page.is_empty() {
            debug!(source = source.name(), "source exhausted");
            break;
        }

        let (mut candidates, filtered): (Vec<Post>, Vec<Post>) = page.into_iter().partition(|p| filter.accepts(p));
        batch
            .skipped
            .extend(filtered.into_iter().map(|post| SkippedPost { post, reason: SkipReason::Filtered }));

        let results = join_all(candidates.iter_mut().map(|post| async move {
            post.resolve_links(registry, fetcher).await.map(|urls| urls.len())
        }))
        .await;

        for (post, result) in candidates.into_iter().zip(results) {
            match result {
                Ok(0) => batch.skipped.push(SkippedPost { post, reason: SkipReason::NoMatch }),
                Ok(_) => batch.posts.push(post),
                Err(e) => {
                    debug!(post = post.id(), error = %e, "could not resolve post");
                    batch.skipped.push(SkippedPost { post, reason: SkipReason::Failed(e) });
                }
            }
        }
    }

    if batch.posts.len() > amount {
        let extra = batch.posts.split_off(amount);
        debug!(extra = extra.len(), "resolved posts beyond the batch size");
        batch
            .skipped
            .extend(extra.into_iter().map(|post| SkippedPost { post, reason: SkipReason::OverQuota }));
    }
    info!(kept = batch.posts.len(), skipped = batch.skipped.len(), "collected batch");
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::pipeline::post::tests::meta;
    use crate::plugins::registry::FetchContext;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct QueueSource {
        posts: VecDeque<Post>,
        pages: Vec<usize>,
    }

    #[async_trait]
    impl PostSource for QueueSource {
        fn name(&self) -> &'static str {
            "queue"
        }

        fn can_unsave(&self) -> bool {
            false
        }

        async fn next_page(&mut self, limit: usize) -> Result<Vec<Post>, SourceError> {
            self.pages.push(limit);
            let n = limit.min(self.posts.len());
            Ok(self.posts.drain(..n).collect())
        }

        async fn unsave(&self, _post_id: &str) -> Result<(), SourceError> {
            Ok(())
        }
    }

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg").set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html").set_body_string("<html></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    fn source(urls: &[(&str, String)]) -> QueueSource {
        let posts = urls.iter().map(|(id, url)| Post::new(meta(id, "title", url), false)).collect();
        QueueSource { posts, pages: vec![] }
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(FetchContext { retries: 0, ..FetchContext::default() })
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let mut src = source(&[]);
        let result = collect_batch(&mut src, 0, &PostFilter::default(), &ResolverRegistry::with_defaults(), &fetcher()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn overfetches_and_sorts_out_skipped_posts() {
        let server = server().await;
        let base = server.uri();
        let mut src = source(&[
            ("a", format!("{base}/page")),
            ("c", format!("{base}/gone")),
            ("x", format!("{base}/page")),
            ("b", format!("{base}/img.jpg")),
            ("d", format!("{base}/img.jpg")),
            ("e", format!("{base}/img.jpg")),
        ]);

        let batch = collect_batch(&mut src, 2, &PostFilter::default(), &ResolverRegistry::with_defaults(), &fetcher())
            .await
            .unwrap();

        let kept: Vec<&str> = batch.posts.iter().map(|p| p.id()).collect();
        assert_eq!(kept, vec!["b", "d"]);
        assert_eq!(src.pages, vec![4, 2]);

        let reasons: Vec<(&str, &str)> = batch
            .skipped
            .iter()
            .map(|s| {
                let reason = match s.reason {
                    SkipReason::NoMatch => "no-match",
                    SkipReason::Filtered => "filtered",
                    SkipReason::Failed(_) => "failed",
                    SkipReason::OverQuota => "over-quota",
                };
                (s.post.id(), reason)
            })
            .collect();
        assert_eq!(
            reasons,
            vec![("a", "no-match"), ("c", "failed"), ("x", "no-match"), ("e", "over-quota")]
        );
    }

    #[tokio::test]
    async fn stops_when_the_source_runs_dry() {
        let server = server().await;
        let mut src = source(&[("only", format!("{}/img.jpg", server.uri()))]);

        let batch = collect_batch(&mut src, 10, &PostFilter::default(), &ResolverRegistry::with_defaults(), &fetcher())
            .await
            .unwrap();
        assert_eq!(batch.posts.len(), 1);
        assert_eq!(src.pages, vec![20, 18]);
    }

    #[tokio::test]
    async fn filtered_posts_are_never_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;
        let mut src = source(&[("low", format!("{}/img.jpg", server.uri()))]);
        let filter = PostFilter { min_score: Some(100), max_age: None };

        let batch = collect_batch(&mut src, 1, &filter, &ResolverRegistry::with_defaults(), &fetcher())
            .await
            .unwrap();
        assert!(batch.posts.is_empty());
        assert!(matches!(batch.skipped[0].reason, SkipReason::Filtered));
    }

    #[test]
    fn max_age_filter() {
        let post = Post::new(meta("old", "t", "https://x"), false);
        assert!(PostFilter::default().accepts(&post));
        assert!(!PostFilter { min_score: None, max_age: Some(Duration::days(1)) }.accepts(&post));
    }
}
