use crate::error::ResolveError;
use crate::pipeline::batch::{collect_batch, PostFilter, SkipReason, SkippedPost};
use crate::pipeline::events::ScrapeEvent;
use crate::pipeline::log::{DomainTally, LogSink};
use crate::pipeline::post::Post;
use crate::pipeline::retrieval::{RetrievalOptions, Retriever};
use crate::plugins::http::fetch::HttpFetcher;
use crate::plugins::registry::ResolverRegistry;
use crate::source::PostSource;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub directory: PathBuf,
    /// Save into one folder per subcategory.
    pub organize: bool,
    /// Posts with resolvable media to process.
    pub limit: usize,
    pub filter: PostFilter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("Output"), organize: false, limit: 1000, filter: PostFilter::default() }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub processed: usize,
    pub images_saved: usize,
    pub images_failed: usize,
    pub unsaved: usize,
    pub skipped: usize,
    /// Links no provider could handle, by domain.
    pub incompatible: DomainTally,
}

#[derive(Clone)]
pub struct Engine {
    registry: Arc<ResolverRegistry>,
    fetcher: HttpFetcher,
    retriever: Retriever,
    config: EngineConfig,
    event_tx: broadcast::Sender<ScrapeEvent>,
}

impl Engine {
    pub async fn new(
        registry: ResolverRegistry,
        fetcher: HttpFetcher,
        options: RetrievalOptions,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        let (event_tx, _) = broadcast::channel(256);

        tokio::fs::create_dir_all(&config.directory)
            .await
            .with_context(|| format!("create output directory {}", config.directory.display()))?;

        let retriever = Retriever::new(fetcher.clone(), options).with_events(event_tx.clone());
        Ok(Self { registry: Arc::new(registry), fetcher, retriever, config, event_tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: ScrapeEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Collects a batch from `source`, downloads it, and logs every post it looked at.
    pub async fn run(&self, source: &mut dyn PostSource, log: &dyn LogSink) -> anyhow::Result<RunReport> {
        let batch = collect_batch(source, self.config.limit, &self.config.filter, &self.registry, &self.fetcher)
            .await
            .with_context(|| format!("collect posts from {}", source.name()))?;

        self.emit(ScrapeEvent::Info {
            scope: source.name().to_string(),
            message: format!("{} post(s) with images, {} skipped", batch.posts.len(), batch.skipped.len()),
        });

        let mut report = RunReport { skipped: batch.skipped.len(), ..RunReport::default() };

        for skipped in &batch.skipped {
            self.record_skipped(skipped, log, &mut report.incompatible).await;
        }

        for mut post in batch.posts {
            self.emit(ScrapeEvent::PostQueued {
                post_id: post.id().to_string(),
                title: post.title().to_string(),
                found: post.urls().len(),
            });

            post.download_all(&self.retriever, &self.config.directory, None, self.config.organize).await;

            let saved = post.count_saved();
            report.processed += 1;
            report.images_saved += saved;
            report.images_failed += post.urls().len() - saved;

            if let Err(e) = log.append(&post.log_record(None)).await {
                warn!(post = post.id(), error = %e, "could not append to run log");
            }

            if self.unsave_if_done(&post, &*source).await {
                report.unsaved += 1;
            }

            self.emit(ScrapeEvent::PostFinished {
                post_id: post.id().to_string(),
                saved,
                found: post.urls().len(),
            });
        }

        info!(
            processed = report.processed,
            saved = report.images_saved,
            failed = report.images_failed,
            skipped = report.skipped,
            "run finished"
        );
        Ok(report)
    }

    async fn record_skipped(&self, skipped: &SkippedPost, log: &dyn LogSink, tally: &mut DomainTally) {
        let post = &skipped.post;
        let note = match &skipped.reason {
            SkipReason::Filtered => {
                self.emit_skipped(post, "filtered out".to_string());
                return;
            }
            SkipReason::OverQuota => {
                self.emit_skipped(post, "beyond the run limit".to_string());
                return;
            }
            SkipReason::NoMatch => {
                tally.record(post.url());
                match self.registry.unsupported_provider_for(post.url()) {
                    Some(provider) => format!("{provider} links are not supported yet"),
                    None => "no provider recognized the link".to_string(),
                }
            }
            SkipReason::Failed(ResolveError::Fetch(e)) => e.to_string(),
            SkipReason::Failed(e) => {
                tally.record(post.url());
                e.to_string()
            }
        };

        self.emit_skipped(post, note.clone());
        if let Err(e) = log.append(&post.log_record(Some(note))).await {
            warn!(post = post.id(), error = %e, "could not append to run log");
        }
    }

    fn emit_skipped(&self, post: &Post, reason: String) {
        self.emit(ScrapeEvent::PostSkipped { post_id: post.id().to_string(), url: post.url().to_string(), reason });
    }

    /// Only posts whose every image made it to disk leave the saved list.
    async fn unsave_if_done(&self, post: &Post, source: &dyn PostSource) -> bool {
        if !post.fully_saved() || !source.can_unsave() {
            return false;
        }
        match post.unsave(source, false).await {
            Ok(done) => done,
            Err(e) => {
                warn!(post = post.id(), error = %e, "could not unsave post");
                false
            }
        }
    }
}
