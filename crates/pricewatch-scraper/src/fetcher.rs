//! Page fetcher: paced, retried rendering with a page-shape check.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::{AppConfig, RetryPolicy};
use rand::Rng;

use crate::error::ScraperError;
use crate::extract::contains_selector;
use crate::renderer::PageRenderer;
use crate::snapshot::write_snapshot;

/// Slack on top of the page timeout before the fetcher gives up on a
/// renderer that ignores its own timeout.
const RENDER_GRACE: Duration = Duration::from_secs(5);

/// Longest `Retry-After` the fetcher will wait out before the next attempt.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub pre_delay_min: Duration,
    pub pre_delay_max: Duration,
    pub page_timeout: Duration,
    pub retry: RetryPolicy,
    /// Where unexpected pages are saved. `None` disables snapshots.
    pub snapshot_dir: Option<PathBuf>,
}

impl FetchSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            pre_delay_min: Duration::from_millis(config.pre_request_delay_min_ms),
            pre_delay_max: Duration::from_millis(config.pre_request_delay_max_ms),
            page_timeout: Duration::from_secs(config.page_timeout_secs),
            retry: RetryPolicy::fixed(
                config.fetch_max_attempts,
                Duration::from_millis(config.fetch_retry_delay_ms),
            ),
            snapshot_dir: Some(config.snapshot_dir.clone()),
        }
    }
}

/// One page to fetch, with the labels used for logs and snapshots.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub url: &'a str,
    /// Marker that must be present for the page to count as a listing.
    pub wait_selector: &'a str,
    pub category: &'a str,
    pub page: u32,
}

pub struct PageFetcher {
    renderer: Arc<dyn PageRenderer>,
    settings: FetchSettings,
}

impl PageFetcher {
    #[must_use]
    pub fn new(renderer: Arc<dyn PageRenderer>, settings: FetchSettings) -> Self {
        Self { renderer, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches one page and checks that it carries the listing marker.
    ///
    /// Every attempt waits a random pre-request delay first. Transient
    /// failures are retried per the configured policy; after a 429 the next
    /// attempt also waits at least the server's `Retry-After` (capped at five
    /// minutes).
    ///
    /// # Errors
    ///
    /// - [`ScraperError::FetchFailed`] once retries are exhausted (or on a
    ///   non-transient render error), carrying the last cause.
    /// - [`ScraperError::UnexpectedPageShape`] when the page rendered but the
    ///   marker is absent. A snapshot is written first when enabled.
    /// - [`ScraperError::InvalidSelector`] if the marker does not parse.
    pub async fn fetch(&self, request: &PageRequest<'_>) -> Result<String, ScraperError> {
        let timeout = self.settings.page_timeout;

        let html = self
            .settings
            .retry
            .run(ScraperError::is_transient, |attempt| async move {
                tokio::time::sleep(self.pre_request_delay()).await;
                tracing::debug!(
                    category = request.category,
                    page = request.page,
                    attempt,
                    url = request.url,
                    "fetching page"
                );
                let render = self
                    .renderer
                    .render(request.url, request.wait_selector, timeout);
                let result = match tokio::time::timeout(timeout + RENDER_GRACE, render).await {
                    Ok(result) => result,
                    Err(_) => Err(ScraperError::Timeout {
                        url: request.url.to_owned(),
                        timeout_secs: timeout.as_secs(),
                    }),
                };
                if let Err(ScraperError::RateLimited {
                    retry_after_secs, ..
                }) = &result
                {
                    self.wait_out_rate_limit(request, attempt, *retry_after_secs)
                        .await;
                }
                result
            })
            .await
            .map_err(|e| ScraperError::FetchFailed {
                url: request.url.to_owned(),
                attempts: e.attempts,
                source: Box::new(e.source),
            })?;

        if contains_selector(&html, request.wait_selector)? {
            return Ok(html);
        }

        let snapshot = match &self.settings.snapshot_dir {
            Some(dir) => match write_snapshot(dir, request.category, request.page, &html).await {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(
                        category = request.category,
                        page = request.page,
                        error = %e,
                        "failed to write page snapshot"
                    );
                    None
                }
            },
            None => None,
        };
        tracing::warn!(
            category = request.category,
            page = request.page,
            url = request.url,
            marker = request.wait_selector,
            snapshot = ?snapshot,
            "page is missing the listing marker"
        );

        Err(ScraperError::UnexpectedPageShape {
            url: request.url.to_owned(),
            marker: request.wait_selector.to_owned(),
            snapshot,
        })
    }

    /// Tops the policy's retry delay up to the server's `Retry-After`, so the
    /// next attempt starts no earlier than the server asked.
    async fn wait_out_rate_limit(
        &self,
        request: &PageRequest<'_>,
        attempt: u32,
        retry_after_secs: u64,
    ) {
        let retry = &self.settings.retry;
        if attempt >= retry.max_attempts {
            return;
        }
        let asked = Duration::from_secs(retry_after_secs).min(MAX_RETRY_AFTER);
        let extra = asked.saturating_sub(retry.delay_after(attempt));
        if extra.is_zero() {
            return;
        }
        tracing::warn!(
            category = request.category,
            page = request.page,
            retry_after_secs,
            "rate limited, waiting before the next attempt"
        );
        tokio::time::sleep(extra).await;
    }

    fn pre_request_delay(&self) -> Duration {
        let min = self.settings.pre_delay_min;
        let max = self.settings.pre_delay_max.max(min);
        if min == max {
            return min;
        }
        rand::rng().random_range(min..=max)
    }
}

#[cfg(test)]
#[path = "fetcher_test.rs"]
mod tests;
