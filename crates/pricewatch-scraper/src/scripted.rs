//! Deterministic [`PageRenderer`] serving canned HTML.
//!
//! Lets the crawler and everything downstream of it run without a network:
//! pipeline tests, and replays of saved listing pages.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScraperError;
use crate::renderer::PageRenderer;

#[derive(Debug, Default)]
struct Script {
    pages: HashMap<String, String>,
    /// Remaining forced failures per URL.
    failures: HashMap<String, u32>,
    /// Remaining 429 answers per URL, with their `Retry-After` seconds.
    rate_limits: HashMap<String, (u32, u64)>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedRenderer {
    script: Mutex<Script>,
    latency: Duration,
}

impl ScriptedRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every render of `url` takes `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Serve `html` for `url`, replacing any previous page.
    pub fn set_page(&self, url: impl Into<String>, html: impl Into<String>) {
        self.lock().pages.insert(url.into(), html.into());
    }

    /// The next `times` renders of `url` fail with a timeout.
    pub fn fail_next(&self, url: impl Into<String>, times: u32) {
        self.lock().failures.insert(url.into(), times);
    }

    /// The next `times` renders of `url` answer 429 with `retry_after_secs`.
    pub fn rate_limit_next(&self, url: impl Into<String>, times: u32, retry_after_secs: u64) {
        self.lock()
            .rate_limits
            .insert(url.into(), (times, retry_after_secs));
    }

    /// Forget all pages, failures and recorded calls.
    pub fn clear(&self) {
        *self.lock() = Script::default();
    }

    /// URLs rendered so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    async fn render(
        &self,
        url: &str,
        _wait_selector: &str,
        timeout: Duration,
    ) -> Result<String, ScraperError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut script = self.lock();
        script.calls.push(url.to_owned());

        if let Some((remaining, retry_after_secs)) = script.rate_limits.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ScraperError::RateLimited {
                    domain: crate::renderer::origin::extract_domain(url),
                    retry_after_secs: *retry_after_secs,
                });
            }
        }

        if let Some(remaining) = script.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ScraperError::Timeout {
                    url: url.to_owned(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        }

        script
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScraperError::UnexpectedStatus {
                status: 404,
                url: url.to_owned(),
            })
    }
}
