use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::Category;
use crate::shape::PageShape;
use crate::ConfigError;

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub slug: String,
    pub title: String,
    pub url: String,
    /// Percent drop that triggers a notification. Falls back to the
    /// configured default when absent.
    pub discount_threshold: Option<u8>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl CategoryConfig {
    #[must_use]
    pub fn into_category(self, default_threshold: Decimal) -> Category {
        Category {
            slug: self.slug,
            title: self.title,
            url: self.url,
            discount_threshold: self
                .discount_threshold
                .map_or(default_threshold, Decimal::from),
            is_active: self.active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesFile {
    pub categories: Vec<CategoryConfig>,
    /// Overrides the built-in listing layout for every category.
    #[serde(default)]
    pub page_shape: Option<PageShape>,
}

impl CategoriesFile {
    /// Page shape to crawl with: the file override or the built-in default.
    #[must_use]
    pub fn page_shape(&self) -> PageShape {
        self.page_shape.clone().unwrap_or_default()
    }
}

/// Load and validate the categories configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_categories(path: &Path) -> Result<CategoriesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CategoriesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: CategoriesFile = serde_yaml::from_str(&content)?;
    validate_categories(&file)?;
    Ok(file)
}

/// Returns `true` for slugs made of lowercase ASCII letters, digits and `-`.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validates a single category definition.
///
/// # Errors
///
/// Returns `ConfigError::Validation` describing the first problem found.
pub fn validate_category(category: &CategoryConfig) -> Result<(), ConfigError> {
    if !is_valid_slug(&category.slug) {
        return Err(ConfigError::Validation(format!(
            "category slug '{}' must be non-empty lowercase letters, digits, or '-'",
            category.slug
        )));
    }

    if category.title.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "category '{}' has an empty title",
            category.slug
        )));
    }

    let url = category.url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::Validation(format!(
            "category '{}' has non-http url '{}'",
            category.slug, category.url
        )));
    }

    if let Some(threshold) = category.discount_threshold {
        if threshold > 100 {
            return Err(ConfigError::Validation(format!(
                "category '{}' has invalid discount_threshold {threshold}; must be 0..=100",
                category.slug
            )));
        }
    }

    Ok(())
}

fn validate_categories(file: &CategoriesFile) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();

    for category in &file.categories {
        validate_category(category)?;

        if !seen_slugs.insert(category.slug.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category slug: '{}'",
                category.slug
            )));
        }
    }

    if let Some(shape) = &file.page_shape {
        if shape.page_size == 0 {
            return Err(ConfigError::Validation(
                "page_shape.page_size must be at least 1".to_string(),
            ));
        }
        if shape.item_selector.trim().is_empty() {
            return Err(ConfigError::Validation(
                "page_shape.item_selector must be non-empty".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "categories_test.rs"]
mod tests;
