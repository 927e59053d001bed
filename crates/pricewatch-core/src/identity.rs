//! Product identity resolution.
//!
//! A key is extracted from the product URL by the first matching rule in
//! [`RULES`]. URLs that embed no recognizable code get a fallback key hashed
//! from the normalized URL, so the same listing resolves to the same key on
//! every run.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::ProductKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("cannot resolve product key from an empty URL")]
    EmptyUrl,
}

/// Prefix that marks keys derived from the URL hash rather than a site code.
pub const FALLBACK_PREFIX: &str = "FALLBACK-";

const MIN_CODE_LEN: usize = 5;

struct Rule {
    name: &'static str,
    pattern: Regex,
}

fn rule(name: &'static str, pattern: &str) -> Rule {
    Rule {
        name,
        pattern: Regex::new(pattern).expect("valid identity regex"),
    }
}

/// Ordered extraction rules; the first valid capture wins.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule("p-code", r"(?:^|[-/])p-([A-Z0-9]+)"),
        rule("pm-code", r"(?:^|[-/])pm-([A-Z0-9]+)"),
        rule("hb-code", r"(?i)-((?:HBC|HBV|HB)[A-Z0-9]+)"),
        rule("ailepil", r"(?i)-(ailepil[0-9]+)"),
        rule("urunler", r"/urunler/([A-Z0-9]+)"),
        rule("trailing-code", r"-([A-Z0-9]{8,})$"),
    ]
});

/// Derive a stable product key from a product detail URL.
///
/// # Errors
///
/// Returns [`IdentityError::EmptyUrl`] when `url` is blank.
pub fn resolve_product_key(url: &str) -> Result<ProductKey, IdentityError> {
    let normalized = normalize_url(url);
    if normalized.is_empty() {
        return Err(IdentityError::EmptyUrl);
    }

    let path = path_of(&normalized);
    for rule in RULES.iter() {
        let Some(code) = rule
            .pattern
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };

        if is_valid_code(code) {
            tracing::trace!(rule = rule.name, code, "resolved product key");
            return Ok(ProductKey::new(code.to_uppercase()));
        }
    }

    Ok(fallback_key(&normalized))
}

/// Accepts codes of at least five characters drawn from `[A-Za-z0-9_-]`.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.len() >= MIN_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn fallback_key(normalized_url: &str) -> ProductKey {
    let digest = Sha256::digest(normalized_url.as_bytes());
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    ProductKey::new(format!("{FALLBACK_PREFIX}{hex}"))
}

/// Drops query and fragment, lower-cases scheme and host, trims trailing `/`.
fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();

    let normalized = match without_query.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.find('/') {
                Some(idx) => rest.split_at(idx),
                None => (rest, ""),
            };
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => without_query.to_string(),
    };

    normalized.trim_end_matches('/').to_string()
}

fn path_of(normalized_url: &str) -> &str {
    match normalized_url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |idx| &rest[idx..]),
        None => normalized_url,
    }
}
