//! Listing link cleanup ahead of identity resolution.

use percent_encoding::percent_decode_str;
use reqwest::Url;

use crate::error::ScraperError;

/// Resolves a card's `href` into an absolute product URL.
///
/// Tracking wrappers that carry the real target in a `redirect` query
/// parameter are unwrapped (and percent-decoded once more when the target was
/// double-encoded). Relative links resolve against `base`. Returns `None` for
/// empty, fragment-only and `javascript:` hrefs.
#[must_use]
pub fn clean_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    let resolved = base.join(href).ok()?;
    let redirect = resolved
        .query_pairs()
        .find(|(key, _)| key == "redirect")
        .map(|(_, value)| value.into_owned());

    match redirect {
        Some(target) if !target.is_empty() => {
            let decoded = if target.contains('%') {
                percent_decode_str(&target).decode_utf8_lossy().into_owned()
            } else {
                target
            };
            base.join(&decoded).ok().map(String::from)
        }
        _ => Some(resolved.into()),
    }
}

/// Builds the URL of page `page` of a category listing.
///
/// Page 1 is the category URL itself with any existing page parameter
/// removed; later pages carry `page_param=<n>`.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidCategoryUrl`] if `category_url` is not an
/// absolute http(s) URL.
pub fn page_url(category_url: &str, page_param: &str, page: u32) -> Result<String, ScraperError> {
    let mut url = Url::parse(category_url).map_err(|e| ScraperError::InvalidCategoryUrl {
        url: category_url.to_owned(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScraperError::InvalidCategoryUrl {
            url: category_url.to_owned(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != page_param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_query(None);
    if !kept.is_empty() || page > 1 {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        if page > 1 {
            pairs.append_pair(page_param, &page.to_string());
        }
    }
    Ok(url.into())
}
