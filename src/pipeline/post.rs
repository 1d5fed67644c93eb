use crate::error::{FormatError, ResolveError, SourceError};
use crate::pipeline::log::LogRecord;
use crate::pipeline::model::{DownloadOutcome, PostMeta, ResolvedUrls};
use crate::pipeline::retrieval::{RetrievalRequest, Retriever};
use crate::pipeline::title;
use crate::plugins::http::fetch::HttpFetcher;
use crate::plugins::registry::ResolverRegistry;
use crate::source::PostSource;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_SUMMARY: &str = "%t\n   r/%s\n   %u\n   Saved %p / %f image(s) so far.";

/// A source post plus what we found and saved for it.
///
/// Keys of the outcome map are always a subset of the resolved urls.
#[derive(Debug, Clone)]
pub struct Post {
    meta: PostMeta,
    can_unsave: bool,
    urls: ResolvedUrls,
    outcomes: HashMap<String, DownloadOutcome>,
}

impl Post {
    /// `can_unsave` should only be true for posts taken from a mutable saved list.
    pub fn new(meta: PostMeta, can_unsave: bool) -> Self {
        Self { meta, can_unsave, urls: ResolvedUrls::new(), outcomes: HashMap::new() }
    }

    pub fn meta(&self) -> &PostMeta {
        &self.meta
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn subcategory(&self) -> &str {
        &self.meta.subcategory
    }

    pub fn url(&self) -> &str {
        &self.meta.url
    }

    pub fn author(&self) -> &str {
        &self.meta.author
    }

    pub fn nsfw(&self) -> bool {
        self.meta.nsfw
    }

    pub fn score(&self) -> i64 {
        self.meta.score
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.meta.created
    }

    pub fn can_unsave(&self) -> bool {
        self.can_unsave
    }

    pub fn urls(&self) -> &ResolvedUrls {
        &self.urls
    }

    pub fn outcomes(&self) -> &HashMap<String, DownloadOutcome> {
        &self.outcomes
    }

    pub fn title_case(&self) -> String {
        title::title_case(&self.meta.title)
    }

    /// Sanitized title, or the post id when nothing of the title survives.
    pub fn file_title(&self, title_case: bool) -> String {
        let name = title::sanitize(&self.meta.title, title_case);
        if name.is_empty() {
            self.meta.id.clone()
        } else {
            name
        }
    }

    pub fn score_at_least(&self, minimum: Option<i64>) -> bool {
        minimum.map_or(true, |m| self.meta.score >= m)
    }

    pub fn count_saved(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_saved()).count()
    }

    /// True when urls were found and every one of them was saved.
    pub fn fully_saved(&self) -> bool {
        !self.urls.is_empty() && self.urls.iter().all(|u| self.outcomes.get(u).is_some_and(DownloadOutcome::is_saved))
    }

    /// Fetches the post's link and runs it through the registry. A fetch error is
    /// returned as such; an unknown link is `Ok` with an empty set. Every call fetches again.
    pub async fn resolve_links(
        &mut self,
        registry: &ResolverRegistry,
        fetcher: &HttpFetcher,
    ) -> Result<&ResolvedUrls, ResolveError> {
        self.urls = ResolvedUrls::new();
        let response = fetcher.get_ok(&self.meta.url).await?;
        self.urls = registry.resolve(&response, fetcher).await?;
        let urls = &self.urls;
        self.outcomes.retain(|u, _| urls.contains(u));
        debug!(post = %self.meta.id, found = self.urls.len(), "resolved post links");
        Ok(&self.urls)
    }

    /// Downloads every resolved url into `directory`, named after `title` (or
    /// the post title), optionally inside a folder named after the subcategory.
    pub async fn download_all(
        &mut self,
        retriever: &Retriever,
        directory: &Path,
        title: Option<&str>,
        organize: bool,
    ) -> &HashMap<String, DownloadOutcome> {
        if self.urls.is_empty() {
            return &self.outcomes;
        }

        let title_case = retriever.options().title_case;
        let base_title = match title.map(|t| title::sanitize(t, title_case)) {
            Some(t) if !t.is_empty() => t,
            _ => self.file_title(title_case),
        };

        let outcomes = retriever
            .download_all(RetrievalRequest {
                label: &self.meta.id,
                urls: &self.urls,
                directory,
                base_title: &base_title,
                subcategory: organize.then_some(self.meta.subcategory.as_str()),
            })
            .await;
        self.outcomes.extend(outcomes);
        &self.outcomes
    }

    /// Renders `template`, where `token` followed by a specifier is replaced:
    ///
    /// - `t` title, `T` title in title case
    /// - `s` subcategory, `a` author, `u` post url
    /// - `p` number of saved urls, `f` number of resolved urls
    /// - `token` itself for a literal token
    pub fn summary(&self, template: &str, token: char) -> Result<String, FormatError> {
        let mut out = String::with_capacity(template.len());
        let mut in_specifier = false;

        for (position, c) in template.chars().enumerate() {
            if !in_specifier {
                if c == token {
                    in_specifier = true;
                } else {
                    out.push(c);
                }
                continue;
            }

            in_specifier = false;
            match c {
                c if c == token => out.push(token),
                't' => out.push_str(&self.meta.title),
                'T' => out.push_str(&self.title_case()),
                's' => out.push_str(&self.meta.subcategory),
                'a' => out.push_str(&self.meta.author),
                'u' => out.push_str(&self.meta.url),
                'p' => out.push_str(&self.count_saved().to_string()),
                'f' => out.push_str(&self.urls.len().to_string()),
                other => {
                    return Err(FormatError::MalformedSpecifier {
                        template: template.to_string(),
                        position,
                        specifier: other,
                    })
                }
            }
        }

        if in_specifier {
            return Err(FormatError::TrailingToken { template: template.to_string() });
        }
        Ok(out)
    }

    /// Marks the post processed on its platform. Returns whether it was unsaved.
    pub async fn unsave(&self, source: &dyn PostSource, force: bool) -> Result<bool, SourceError> {
        if !(force || self.can_unsave) {
            return Ok(false);
        }
        source.unsave(&self.meta.id).await?;
        Ok(true)
    }

    pub fn log_record(&self, note: Option<String>) -> LogRecord {
        let recognized_urls = self
            .urls
            .iter()
            .map(|u| {
                let path = self.outcomes.get(u).and_then(|o| o.path()).map(|p| p.display().to_string());
                (u.to_string(), path)
            })
            .collect();

        LogRecord {
            title: self.meta.title.clone(),
            id: self.meta.id.clone(),
            url: self.meta.url.clone(),
            recognized_urls,
            exception: note.unwrap_or_default(),
        }
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary(DEFAULT_SUMMARY, '%').map_err(|_| fmt::Error)?;
        f.write_str(&summary)
    }
}
