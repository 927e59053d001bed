//! Browser identity presented to the listing site.

use rand::Rng;

/// Desktop browser user agents rotated between requests.
pub(crate) const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
];

pub(crate) const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Picks the user agent for one request: the configured override when set,
/// otherwise a random entry of [`USER_AGENT_POOL`].
pub(crate) fn pick_user_agent(configured: Option<&str>) -> &str {
    if let Some(ua) = configured {
        return ua;
    }
    let index = rand::rng().random_range(0..USER_AGENT_POOL.len());
    USER_AGENT_POOL[index]
}
