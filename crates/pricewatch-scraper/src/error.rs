use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {domain} (retry after {retry_after_secs}s)")]
    RateLimited {
        domain: String,
        retry_after_secs: u64,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("render of {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("failed to fetch {url} after {attempts} attempt(s): {source}")]
    FetchFailed {
        url: String,
        attempts: u32,
        #[source]
        source: Box<ScraperError>,
    },

    #[error("page {url} is missing the expected marker '{marker}'")]
    UnexpectedPageShape {
        url: String,
        marker: String,
        snapshot: Option<PathBuf>,
    },

    #[error("crawl budget exhausted while crawling {category}")]
    BudgetExceeded { category: String },

    #[error("invalid category URL \"{url}\": {reason}")]
    InvalidCategoryUrl { url: String, reason: String },

    #[error("invalid selector \"{selector}\": {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl ScraperError {
    /// Whether a single page render is worth another attempt.
    ///
    /// Network failures, timeouts, rate limits and server-side statuses are
    /// transient. A 404 or 410 means the listing is gone.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::UnexpectedStatus { status, .. } => !matches!(status, 404 | 410),
            _ => false,
        }
    }
}
