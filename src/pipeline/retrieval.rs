//! Concurrent download of a post's resolved urls.
//!
//! Fetches run in parallel. Naming is done one url at a time, in resolved
//! order, on the task that drains the fetch stream, so two siblings can never
//! claim the same file name and reruns number files the same way.

use crate::error::DownloadFailure;
use crate::pipeline::events::ScrapeEvent;
use crate::pipeline::extension;
use crate::pipeline::model::{DownloadOutcome, ResolvedUrls};
use crate::plugins::http::fetch::HttpFetcher;
use bytes::Bytes;
use futures::stream::{self, FuturesUnordered, StreamExt};
use image::ImageFormat;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const JPEG_EXTENSIONS: [&str; 2] = [".jpg", ".jpeg"];
const PNG_EXTENSION: &str = ".png";

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub title_case: bool,
    pub convert_png: bool,
    pub max_concurrency: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { title_case: false, convert_png: false, max_concurrency: 8 }
    }
}

/// One batch: every url lands in `directory` (or its `subcategory` folder)
/// named after `base_title`.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalRequest<'a> {
    /// Tag used in events and logs, usually the post id.
    pub label: &'a str,
    pub urls: &'a ResolvedUrls,
    pub directory: &'a Path,
    pub base_title: &'a str,
    pub subcategory: Option<&'a str>,
}

/// Hands out collision-free stems for one retrieval call. The counter is
/// never reset, so sibling images keep counting up.
#[derive(Debug)]
struct NameClaimer {
    base: String,
    offset: u32,
    claimed: HashSet<String>,
}

impl NameClaimer {
    fn new(base: &str) -> Self {
        Self { base: base.to_string(), offset: 0, claimed: HashSet::new() }
    }

    fn stem(&self) -> String {
        if self.offset == 0 {
            self.base.clone()
        } else {
            format!("{} ({})", self.base, self.offset)
        }
    }

    /// Returns a stem for which `stem + ext` is free for every ext, both on
    /// disk and among names already handed out.
    fn claim(&mut self, existing: &HashSet<String>, exts: &[&str]) -> String {
        loop {
            let stem = self.stem();
            let names: Vec<String> = exts.iter().map(|ext| format!("{stem}{ext}")).collect();
            if names.iter().all(|n| !existing.contains(n) && !self.claimed.contains(n)) {
                self.claimed.extend(names);
                return stem;
            }
            self.offset += 1;
        }
    }
}

/// A fetched body with its claimed destination, waiting to be written.
struct PendingWrite {
    url: String,
    body: Bytes,
    target: PathBuf,
    png_target: Option<PathBuf>,
}

#[derive(Clone)]
pub struct Retriever {
    fetcher: HttpFetcher,
    options: RetrievalOptions,
    event_tx: Option<broadcast::Sender<ScrapeEvent>>,
}

impl Retriever {
    pub fn new(fetcher: HttpFetcher, options: RetrievalOptions) -> Self {
        Self { fetcher, options, event_tx: None }
    }

    pub fn with_events(mut self, tx: broadcast::Sender<ScrapeEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    fn emit(&self, event: ScrapeEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Best effort: every url gets an outcome and no single failure aborts the batch.
    pub async fn download_all(&self, req: RetrievalRequest<'_>) -> HashMap<String, DownloadOutcome> {
        let mut outcomes = HashMap::new();
        if req.urls.is_empty() {
            return outcomes;
        }

        let dir = match req.subcategory {
            Some(sub) => req.directory.join(sanitize_filename::sanitize(sub)),
            None => req.directory.to_path_buf(),
        };
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "cannot create destination directory");
            for url in req.urls.iter() {
                outcomes.insert(url.to_string(), DownloadOutcome::Failed(DownloadFailure::Write(e.to_string())));
            }
            return outcomes;
        }

        let fetcher = &self.fetcher;
        let mut fetches = stream::iter(req.urls.iter().map(str::to_string))
            .map(|url| async move {
                let result = fetcher.get(&url).await;
                (url, result)
            })
            .buffered(self.options.max_concurrency.max(1));

        let mut claimer = NameClaimer::new(req.base_title);
        let mut pending = Vec::new();
        while let Some((url, result)) = fetches.next().await {
            let response = match result {
                Ok(r) if r.is_success() => r,
                Ok(r) => {
                    let failure = if r.status() == reqwest::StatusCode::NOT_FOUND {
                        DownloadFailure::NotFound
                    } else {
                        DownloadFailure::Status(r.status().as_u16())
                    };
                    outcomes.insert(url, DownloadOutcome::Failed(failure));
                    continue;
                }
                Err(e) => {
                    outcomes.insert(url, DownloadOutcome::Failed(e.into()));
                    continue;
                }
            };

            let existing = match list_entries(&dir).await {
                Ok(names) => names,
                Err(e) => {
                    outcomes.insert(url, DownloadOutcome::Failed(DownloadFailure::Write(e.to_string())));
                    continue;
                }
            };

            let ext = extension::from_response(&response);
            let convert = self.options.convert_png && JPEG_EXTENSIONS.contains(&ext.as_str());
            let stem = if convert {
                claimer.claim(&existing, &[ext.as_str(), PNG_EXTENSION])
            } else {
                claimer.claim(&existing, &[ext.as_str()])
            };
            debug!(%url, stem = %stem, "claimed file name");

            pending.push(PendingWrite {
                target: dir.join(format!("{stem}{ext}")),
                png_target: convert.then(|| dir.join(format!("{stem}{PNG_EXTENSION}"))),
                body: response.bytes().clone(),
                url,
            });
        }

        let mut writes: FuturesUnordered<_> = pending
            .into_iter()
            .map(|w| async move {
                let outcome = store(&w).await;
                (w.url, outcome)
            })
            .collect();

        while let Some((url, outcome)) = writes.next().await {
            outcomes.insert(url, outcome);
        }

        for (url, outcome) in &outcomes {
            match outcome {
                DownloadOutcome::Saved(path) => self.emit(ScrapeEvent::ItemSaved {
                    post_id: req.label.to_string(),
                    url: url.clone(),
                    path: path.clone(),
                }),
                DownloadOutcome::Failed(reason) => {
                    warn!(post = req.label, %url, %reason, "download failed");
                    self.emit(ScrapeEvent::ItemFailed {
                        post_id: req.label.to_string(),
                        url: url.clone(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        let saved = outcomes.values().filter(|o| o.is_saved()).count();
        info!(post = req.label, saved, total = outcomes.len(), "retrieval finished");
        outcomes
    }
}

async fn list_entries(dir: &Path) -> std::io::Result<HashSet<String>> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

async fn write_new(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(body).await?;
    file.flush().await
}

async fn store(w: &PendingWrite) -> DownloadOutcome {
    if let Err(e) = write_new(&w.target, &w.body).await {
        return DownloadOutcome::Failed(DownloadFailure::Write(format!("{}: {}", w.target.display(), e)));
    }

    let Some(png) = &w.png_target else {
        return DownloadOutcome::Saved(w.target.clone());
    };

    let (jpeg, png_path) = (w.target.clone(), png.clone());
    let converted = tokio::task::spawn_blocking(move || convert_to_png(&jpeg, &png_path)).await;
    match converted {
        Ok(Ok(())) => {
            if let Err(e) = tokio::fs::remove_file(&w.target).await {
                warn!(path = %w.target.display(), error = %e, "could not remove converted jpeg");
            }
            DownloadOutcome::Saved(png.clone())
        }
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(png).await;
            DownloadOutcome::Failed(DownloadFailure::Conversion(e.to_string()))
        }
        Err(e) => DownloadOutcome::Failed(DownloadFailure::Conversion(e.to_string())),
    }
}

fn convert_to_png(jpeg: &Path, png: &Path) -> Result<(), image::ImageError> {
    let img = image::open(jpeg)?;
    img.into_rgb8().save_with_format(png, ImageFormat::Png)
}
