//! Append-only run log and the incompatible-domain tally.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use url::Url;

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub title: String,
    pub id: String,
    pub url: String,
    /// Resolved url -> saved path, `null` when it was not saved.
    pub recognized_urls: BTreeMap<String, Option<String>>,
    pub exception: String,
}

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, record: &LogRecord) -> anyhow::Result<()>;
}

/// Discards everything (`--nolog`).
pub struct NullLog;

#[async_trait]
impl LogSink for NullLog {
    async fn append(&self, _record: &LogRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesLog {
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all {}", parent.display()))?;
        }
        Ok(Self { path, lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSink for JsonLinesLog {
    async fn append(&self, record: &LogRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Counts links nothing could scrape, by `scheme://host`, for one run.
#[derive(Debug, Clone, Default)]
pub struct DomainTally {
    counts: HashMap<String, usize>,
}

impl DomainTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, url: &str) {
        let domain = match Url::parse(url) {
            Ok(u) => format!("{}://{}", u.scheme(), u.host_str().unwrap_or_default()),
            Err(_) => url.to_string(),
        };
        *self.counts.entry(domain).or_default() += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Most frequent first, ties by name.
    pub fn sorted(&self) -> Vec<(String, usize)> {
        let mut all: Vec<_> = self.counts.iter().map(|(d, c)| (d.clone(), *c)).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all
    }

    /// Rewrites `path` with one `domain : count` line per domain.
    pub async fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body: String = self
            .sorted()
            .into_iter()
            .map(|(domain, count)| format!("{domain} : {count}\n"))
            .collect();
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("write {}", path.display()))
    }
}
