//! Error taxonomy for link resolution, retrieval, formatting and post sources.
//!
//! "No resolver recognized this link" is not an error here: that outcome is an
//! empty [`ResolvedUrls`](crate::pipeline::model::ResolvedUrls), not an error.

use reqwest::StatusCode;
use thiserror::Error;

/// A network fetch that did not produce a usable response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        timed_out: bool,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: StatusCode },
}

impl FetchError {
    pub(crate) fn transport(url: &str, err: &reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. } | Self::Transport { url, .. } | Self::Status { url, .. } => url,
        }
    }
}

/// Errors raised while expanding a recognized link into direct image urls.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The page was fetched but the element we scrape for is not there.
    #[error("malformed page {url}: no {missing} found")]
    MalformedPage { url: String, missing: &'static str },

    /// A recognized link whose shape has no extraction rule yet.
    #[error("unsupported {shape} at {url}")]
    UnsupportedShape { url: String, shape: &'static str },

    #[error("provider {provider} is not implemented")]
    NotImplemented { provider: &'static str },

    #[error("invalid descriptor at {url}: {source}")]
    InvalidDescriptor {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a single url could not be delivered to disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadFailure {
    #[error("not found")]
    NotFound,

    #[error("http status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out")]
    TimedOut,

    #[error("write error: {0}")]
    Write(String),

    #[error("png conversion failed: {0}")]
    Conversion(String),
}

impl From<FetchError> for DownloadFailure {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Status { status, .. } if status == StatusCode::NOT_FOUND => Self::NotFound,
            FetchError::Status { status, .. } => Self::Status(status.as_u16()),
            FetchError::Transport { timed_out: true, .. } => Self::TimedOut,
            FetchError::Transport { message, .. } => Self::Transport(message),
            FetchError::InvalidUrl { source, .. } => Self::Transport(source.to_string()),
        }
    }
}

/// A summary template that cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("malformed specifier {specifier:?} at position {position} in {template:?}")]
    MalformedSpecifier {
        template: String,
        position: usize,
        specifier: char,
    },

    #[error("trailing token in {template:?}")]
    TrailingToken { template: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("i/o error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse listing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("source {0} is read-only")]
    ReadOnly(&'static str),
}
