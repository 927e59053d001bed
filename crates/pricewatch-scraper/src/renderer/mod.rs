//! Page rendering capability.
//!
//! [`PageRenderer`] is the seam between the crawler and whatever turns a URL
//! into HTML. [`HttpRenderer`] fetches server-rendered listing pages with
//! `reqwest` while presenting a realistic browser identity.

mod identity;
pub(crate) mod origin;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ScraperError;

pub use origin::extract_origin;

/// Turns a URL into the HTML of the rendered document.
///
/// Implementations should return once `wait_selector` is present in the
/// document or `timeout` elapses. Checking that the marker really is present
/// is the fetcher's job, so a renderer that cannot wait (plain HTTP) simply
/// returns the document it received.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        url: &str,
        wait_selector: &str,
        timeout: Duration,
    ) -> Result<String, ScraperError>;
}

/// Settings for [`HttpRenderer`].
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// Fixed user agent. When `None`, each request picks one from a pool of
    /// desktop browser identities.
    pub user_agent: Option<String>,
    pub accept_language: String,
    pub connect_timeout: Duration,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            user_agent: None,
            accept_language: "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Renderer for server-rendered listing pages.
///
/// Maps 429 to [`ScraperError::RateLimited`] carrying `Retry-After` and any
/// other non-2xx status to [`ScraperError::UnexpectedStatus`]. Retrying is left
/// to the [`PageFetcher`](crate::PageFetcher).
pub struct HttpRenderer {
    client: Client,
    settings: RendererSettings,
}

impl HttpRenderer {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(settings: RendererSettings) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(
        &self,
        url: &str,
        wait_selector: &str,
        timeout: Duration,
    ) -> Result<String, ScraperError> {
        let user_agent = identity::pick_user_agent(self.settings.user_agent.as_deref());
        let referer = extract_origin(url);
        tracing::debug!(url, wait_selector, user_agent, "rendering page");

        let request = self
            .client
            .get(url)
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::ACCEPT, identity::HTML_ACCEPT)
            .header(
                reqwest::header::ACCEPT_LANGUAGE,
                &self.settings.accept_language,
            )
            .header(reqwest::header::REFERER, &referer)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .header("Upgrade-Insecure-Requests", "1");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScraperError::Timeout {
                    url: url.to_owned(),
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                ScraperError::Http(e)
            }
        })?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ScraperError::RateLimited {
                domain: origin::extract_domain(url),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        Ok(response.text().await?)
    }
}
