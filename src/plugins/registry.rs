use async_trait::async_trait;
use crate::error::ResolveError;
use crate::pipeline::model::{LinkResponse, ResolvedUrls};
use crate::plugins::http::fetch::HttpFetcher;
use clap::{ArgMatches, Command};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Classifies a fetched link and expands it into direct image urls.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure check on the already fetched response; no network I/O.
    fn recognizes(&self, response: &LinkResponse) -> bool;

    /// Only meaningful for responses this resolver recognizes. May fetch more pages.
    async fn expand(&self, response: &LinkResponse, fetcher: &HttpFetcher) -> Result<ResolvedUrls, ResolveError>;
}

#[derive(Debug, Clone)]
pub struct FetchContext {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub headers: HashMap<String, String>,
}

impl Default for FetchContext {
    fn default() -> Self {
        Self {
            user_agent: "PaperScraper/0.1".to_string(),
            timeout_secs: 10,
            retries: 2,
            retry_backoff_ms: 400,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeCliConfig {
    pub fetch_ctx: FetchContext,
    pub max_concurrency: usize,
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_scrape_command(&self, cmd: Command) -> Command;
    fn apply_scrape_matches(&self, matches: &ArgMatches, cfg: &mut ScrapeCliConfig) -> anyhow::Result<()>;
}

/// A provider known to the registry, implemented or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub implemented: bool,
}

/// A provider we recognize by host but cannot extract from yet. Kept in the
/// registry for listing and triage only; it is never dispatched to.
#[derive(Debug, Clone)]
struct UnsupportedProvider {
    name: &'static str,
    hosts: &'static [&'static str],
}

/// Ordered resolver list. Built per run (or per test) rather than held globally.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn LinkResolver>>,
    unsupported: Vec<UnsupportedProvider>,
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self { resolvers: vec![], unsupported: vec![], cli_plugins: vec![] }
    }

    pub fn with_defaults() -> Self {
        use crate::plugins::{flickr::resolver::FlickrResolver, gfycat::resolver::GfycatResolver};

        let mut reg = Self::new();

        reg.register(Box::new(crate::plugins::http::resolver::DirectImageResolver::new()));
        reg.register(Box::new(crate::plugins::imgur::resolver::ImgurResolver::new()));

        reg.register_unsupported(FlickrResolver::PROVIDER, FlickrResolver::HOSTS);
        reg.register_unsupported(GfycatResolver::PROVIDER, GfycatResolver::HOSTS);

        reg.cli_plugins.push(Box::new(crate::plugins::http::cli::HttpCliPlugin::new()));
        reg
    }

    pub fn register(&mut self, resolver: Box<dyn LinkResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn register_unsupported(&mut self, name: &'static str, hosts: &'static [&'static str]) {
        self.unsupported.push(UnsupportedProvider { name, hosts });
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.resolvers
            .iter()
            .map(|r| ProviderInfo { name: r.name(), implemented: true })
            .chain(self.unsupported.iter().map(|p| ProviderInfo { name: p.name, implemented: false }))
            .collect()
    }

    /// Name of the not-yet-implemented provider owning this url's host, if any.
    pub fn unsupported_provider_for(&self, url: &str) -> Option<&'static str> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.unsupported
            .iter()
            .find(|p| p.hosts.iter().any(|h| host.eq_ignore_ascii_case(h)))
            .map(|p| p.name)
    }

    pub fn augment_scrape_command(&self, cmd: Command) -> Command {
        self.cli_plugins
            .iter()
            .fold(cmd, |c, p| p.augment_scrape_command(c))
    }

    pub fn apply_scrape_matches(&self, matches: &ArgMatches, cfg: &mut ScrapeCliConfig) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            p.apply_scrape_matches(matches, cfg)?;
        }
        Ok(())
    }

    /// Union of the expansions of every resolver that recognizes the response,
    /// in registry order. An empty set means nothing here knows the link.
    pub async fn resolve(&self, response: &LinkResponse, fetcher: &HttpFetcher) -> Result<ResolvedUrls, ResolveError> {
        let mut found = ResolvedUrls::new();
        for resolver in &self.resolvers {
            if !resolver.recognizes(response) {
                continue;
            }
            debug!(resolver = resolver.name(), url = %response.url(), "resolver recognized link");
            found.union(resolver.expand(response, fetcher).await?);
        }
        Ok(found)
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
