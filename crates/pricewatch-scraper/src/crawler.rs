//! Category crawler.
//!
//! Walks one category listing page by page:
//! `Init -> FetchingFirstPage -> ComputingPageCount -> FetchingPage(n) -> Done`,
//! or `Failed` from any state. Page N's URL depends on the total reported by
//! page 1, so pages are fetched strictly in sequence.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::{AppConfig, Category, PageShape, RawItem, RetryPolicy};
use reqwest::Url;
use tokio::time::Instant;

use crate::error::ScraperError;
use crate::extract::ListingExtractor;
use crate::fetcher::{PageFetcher, PageRequest};
use crate::link::page_url;

/// Upper bound on pages per category, whatever total the site reports.
pub const MAX_PAGES: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Init,
    FetchingFirstPage,
    ComputingPageCount,
    FetchingPage(u32),
    Done,
    Failed,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::FetchingFirstPage => f.write_str("fetching_first_page"),
            Self::ComputingPageCount => f.write_str("computing_page_count"),
            Self::FetchingPage(n) => write!(f, "fetching_page({n})"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Minimum pause between consecutive pages of one category.
    pub inter_page_delay: Duration,
    /// Whole-category attempts. Only [`ScraperError::FetchFailed`] is retried.
    pub category_retry: RetryPolicy,
    pub max_pages: u32,
}

impl CrawlSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            inter_page_delay: Duration::from_millis(config.inter_page_delay_ms),
            category_retry: RetryPolicy::fixed(
                config.category_max_attempts,
                Duration::from_millis(config.category_retry_delay_ms),
            ),
            max_pages: MAX_PAGES,
        }
    }
}

/// Items collected from one category, plus how much of the listing they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub category: String,
    /// Raw items in page order. Duplicate links are possible.
    pub items: Vec<RawItem>,
    pub total_reported: Option<u32>,
    pub pages_planned: u32,
    pub pages_fetched: u32,
    /// Pages that rendered without the listing marker and were skipped.
    pub skipped_pages: Vec<u32>,
    /// Category attempts used, including the successful one.
    pub attempts: u32,
    /// Whether `items` covers the whole listing. Products missing from an
    /// incomplete crawl must not be treated as gone.
    pub complete: bool,
}

pub struct CategoryCrawler {
    fetcher: PageFetcher,
    extractor: Arc<dyn ListingExtractor>,
    shape: PageShape,
    settings: CrawlSettings,
}

impl CategoryCrawler {
    #[must_use]
    pub fn new(
        fetcher: PageFetcher,
        extractor: Arc<dyn ListingExtractor>,
        shape: PageShape,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            shape,
            settings,
        }
    }

    /// Crawls every page of `category`, retrying the whole category when a
    /// page cannot be fetched.
    ///
    /// `deadline` is the cycle-wide budget. Once it passes, the crawl stops,
    /// even in the middle of a page.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::FetchFailed`] when the last category attempt failed
    ///   to fetch a page.
    /// - [`ScraperError::UnexpectedPageShape`] when page 1 is not a listing.
    /// - [`ScraperError::BudgetExceeded`] when `deadline` passes.
    /// - [`ScraperError::InvalidCategoryUrl`] for a malformed category URL.
    pub async fn crawl(
        &self,
        category: &Category,
        deadline: Instant,
    ) -> Result<CrawlReport, ScraperError> {
        let slug = category.slug.as_str();
        tracing::info!(category = slug, url = %category.url, "category crawl started");

        let result = self
            .settings
            .category_retry
            .run(
                |e: &ScraperError| matches!(e, ScraperError::FetchFailed { .. }),
                |attempt| async move {
                    if Instant::now() >= deadline {
                        return Err(ScraperError::BudgetExceeded {
                            category: slug.to_owned(),
                        });
                    }
                    match tokio::time::timeout_at(deadline, self.crawl_once(category, attempt))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ScraperError::BudgetExceeded {
                            category: slug.to_owned(),
                        }),
                    }
                },
            )
            .await;

        match result {
            Ok(report) => {
                tracing::info!(
                    category = slug,
                    items = report.items.len(),
                    pages = report.pages_fetched,
                    attempts = report.attempts,
                    complete = report.complete,
                    "category crawl finished"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    category = slug,
                    state = %CrawlState::Failed,
                    attempts = e.attempts,
                    error = %e.source,
                    "category crawl failed"
                );
                Err(e.source)
            }
        }
    }

    async fn crawl_once(
        &self,
        category: &Category,
        attempt: u32,
    ) -> Result<CrawlReport, ScraperError> {
        let slug = category.slug.as_str();
        let mut report = CrawlReport {
            category: category.slug.clone(),
            items: Vec::new(),
            total_reported: None,
            pages_planned: 1,
            pages_fetched: 0,
            skipped_pages: Vec::new(),
            attempts: attempt,
            complete: false,
        };
        let mut truncated = false;
        let mut first_page: Option<String> = None;
        let mut state = CrawlState::Init;

        loop {
            tracing::debug!(category = slug, attempt, state = %state, "crawl state");
            state = match state {
                CrawlState::Init => CrawlState::FetchingFirstPage,
                CrawlState::FetchingFirstPage => {
                    let html = self.fetch_page(category, 1).await?;
                    report.pages_fetched = 1;
                    first_page = Some(html);
                    CrawlState::ComputingPageCount
                }
                CrawlState::ComputingPageCount => {
                    let html = first_page.take().unwrap_or_default();
                    report.items.extend(self.extract(category, 1, &html)?);
                    report.total_reported = self.extractor.total_count(&html);

                    let planned = match report.total_reported {
                        Some(total) => self.shape.page_count(total),
                        None => {
                            tracing::warn!(
                                category = slug,
                                "total item count missing, crawling first page only"
                            );
                            1
                        }
                    };
                    if planned > self.settings.max_pages {
                        tracing::warn!(
                            category = slug,
                            planned,
                            max_pages = self.settings.max_pages,
                            "page count capped"
                        );
                        truncated = true;
                    }
                    report.pages_planned = planned.min(self.settings.max_pages);

                    if report.pages_planned >= 2 {
                        CrawlState::FetchingPage(2)
                    } else {
                        CrawlState::Done
                    }
                }
                CrawlState::FetchingPage(page) => {
                    if !self.settings.inter_page_delay.is_zero() {
                        tokio::time::sleep(self.settings.inter_page_delay).await;
                    }
                    match self.fetch_page(category, page).await {
                        Ok(html) => {
                            report.items.extend(self.extract(category, page, &html)?);
                            report.pages_fetched += 1;
                        }
                        Err(ScraperError::UnexpectedPageShape { .. }) => {
                            tracing::warn!(category = slug, page, "skipping page without listing");
                            report.skipped_pages.push(page);
                        }
                        Err(e) => return Err(e),
                    }
                    if page < report.pages_planned {
                        CrawlState::FetchingPage(page + 1)
                    } else {
                        CrawlState::Done
                    }
                }
                CrawlState::Done | CrawlState::Failed => break,
            };
        }

        let page_size = usize::try_from(self.shape.page_size).unwrap_or(usize::MAX);
        let fits_one_page = report.items.len() < page_size;
        report.complete = !truncated
            && report.skipped_pages.is_empty()
            && !report.items.is_empty()
            && (report.total_reported.is_some() || fits_one_page);
        Ok(report)
    }

    async fn fetch_page(&self, category: &Category, page: u32) -> Result<String, ScraperError> {
        let url = page_url(&category.url, &self.shape.page_param, page)?;
        self.fetcher
            .fetch(&PageRequest {
                url: &url,
                wait_selector: &self.shape.ready_selector,
                category: &category.slug,
                page,
            })
            .await
    }

    fn extract(
        &self,
        category: &Category,
        page: u32,
        html: &str,
    ) -> Result<Vec<RawItem>, ScraperError> {
        let url = page_url(&category.url, &self.shape.page_param, page)?;
        let base = Url::parse(&url).map_err(|e| ScraperError::InvalidCategoryUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let items = self.extractor.extract_items(html, &base);
        tracing::debug!(category = %category.slug, page, items = items.len(), "page extracted");
        Ok(items)
    }
}

#[cfg(test)]
#[path = "crawler_test.rs"]
mod tests;
