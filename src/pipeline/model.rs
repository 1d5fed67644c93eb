use crate::error::DownloadFailure;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use url::Url;

/// A fetched page or resource after redirects, kept only while resolving.
#[derive(Debug, Clone)]
pub struct LinkResponse {
    url: Url,
    status: StatusCode,
    content_type: Option<String>,
    body: Bytes,
}

impl LinkResponse {
    pub fn new(url: Url, status: StatusCode, content_type: Option<String>, body: Bytes) -> Self {
        Self { url, status, content_type, body }
    }

    /// Final url, after any redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Direct image urls found for a post, deduplicated in insertion order so that
/// file numbering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolvedUrls(Vec<String>);

impl ResolvedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the url was already present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.0.contains(&url) {
            return false;
        }
        self.0.push(url);
        true
    }

    pub fn union(&mut self, other: ResolvedUrls) {
        for url in other.0 {
            self.insert(url);
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.iter().any(|u| u == url)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ResolvedUrls {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for url in iter {
            set.insert(url);
        }
        set
    }
}

impl IntoIterator for ResolvedUrls {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    Failed(DownloadFailure),
}

impl DownloadOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Saved(p) => Some(p),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&DownloadFailure> {
        match self {
            Self::Saved(_) => None,
            Self::Failed(f) => Some(f),
        }
    }
}

/// Immutable metadata of a source post.
#[derive(Debug, Clone, PartialEq)]
pub struct PostMeta {
    pub id: String,
    pub title: String,
    pub subcategory: String,
    pub url: String,
    pub author: String,
    pub nsfw: bool,
    pub score: i64,
    pub created: DateTime<Utc>,
}
