//! Domain types shared across the crawler, the persistence gateway and the
//! notification dispatcher.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable identifier for a physical product across crawl runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductKey(String);

impl ProductKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProductKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
}

impl ProductStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}

/// A configured listing page plus its own discount-notification threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub slug: String,
    pub title: String,
    pub url: String,
    /// Minimum percent drop (0..=100) that makes a price change notifiable.
    pub discount_threshold: Decimal,
    pub is_active: bool,
}

/// One product card as extracted from a listing page, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub title: String,
    pub price_text: String,
    pub link: String,
    pub image: Option<String>,
}

/// A raw item with its resolved product key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub key: ProductKey,
    pub item: RawItem,
}

/// Last persisted state of a product, as read at the start of a category run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousProduct {
    pub key: ProductKey,
    pub price: i64,
    pub lowest_price: i64,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    PriceDrop,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::New => f.write_str("new"),
            ChangeKind::PriceDrop => f.write_str("price_drop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub key: ProductKey,
    pub title: String,
    pub price: i64,
    pub link: String,
    pub image: Option<String>,
}

/// Classified outcome for one product in one crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub category_slug: String,
    pub product: ProductSnapshot,
    /// Only set for `PriceDrop`.
    pub previous_price: Option<i64>,
    pub percent_change: Option<Decimal>,
}

/// Per-category counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub category: String,
    pub new: u32,
    pub changed: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub deactivated: u32,
}

/// One row of a product's price history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub key: ProductKey,
    pub price: i64,
    pub observed_at: DateTime<Utc>,
}
