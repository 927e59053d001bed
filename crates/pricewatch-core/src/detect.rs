//! Change detection for one category run.
//!
//! [`detect_changes`] diffs the freshly crawled items against the previously
//! persisted state and produces a [`CategoryDelta`]: what to write, which
//! keys went missing, and which change events qualify for notification.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::model::{
    Category, ChangeEvent, ChangeKind, PreviousProduct, ProductKey, ProductSnapshot,
    ProductStatus, ResolvedItem,
};
use crate::price::{normalize_price, PriceBounds};

/// How an observed product's price relates to its stored price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMovement {
    New,
    Dropped { previous: i64 },
    Raised { previous: i64 },
    Unchanged,
    /// Price text failed normalization; the product is seen but not written.
    Unpriced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedProduct {
    pub key: ProductKey,
    pub title: String,
    pub link: String,
    pub image: Option<String>,
    /// `None` when the price text failed normalization.
    pub price: Option<i64>,
    pub movement: PriceMovement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaCounts {
    pub new: u32,
    pub dropped: u32,
    pub raised: u32,
    pub unchanged: u32,
    pub invalid: u32,
    pub missing: u32,
    pub notifiable: u32,
}

impl DeltaCounts {
    /// Observed price changes in either direction.
    #[must_use]
    pub fn changed(&self) -> u32 {
        self.dropped + self.raised
    }
}

/// Everything the persistence gateway and dispatcher need from one category run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDelta {
    pub category_slug: String,
    /// One entry per distinct key, in first-seen order.
    pub observed: Vec<ObservedProduct>,
    /// Previously known keys not seen in this run.
    pub missing: Vec<ProductKey>,
    pub events: Vec<ChangeEvent>,
    pub counts: DeltaCounts,
}

/// Percent drop from `old` to `new`, `(old - new) / old * 100`.
///
/// Negative for a price increase. Returns zero when `old` is not positive.
#[must_use]
pub fn percent_drop(old: i64, new: i64) -> Decimal {
    if old <= 0 {
        return Decimal::ZERO;
    }
    let old_d = Decimal::from(old);
    (old_d - Decimal::from(new)) * Decimal::ONE_HUNDRED / old_d
}

/// Classify this run's items against the previous state of the category.
///
/// Duplicate keys are collapsed with last-write-wins while keeping the
/// position of the first sighting.
#[must_use]
pub fn detect_changes(
    category: &Category,
    items: &[ResolvedItem],
    previous: &HashMap<ProductKey, PreviousProduct>,
    bounds: &PriceBounds,
) -> CategoryDelta {
    let mut order: Vec<ProductKey> = Vec::new();
    let mut latest: HashMap<&ProductKey, &ResolvedItem> = HashMap::new();
    for resolved in items {
        if latest.insert(&resolved.key, resolved).is_none() {
            order.push(resolved.key.clone());
        }
    }

    let mut counts = DeltaCounts::default();
    let mut observed = Vec::with_capacity(order.len());
    let mut events = Vec::new();

    for key in &order {
        let Some(resolved) = latest.get(key) else {
            continue;
        };
        let item = &resolved.item;

        let price = match normalize_price(item.price_text.as_str(), bounds) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(
                    category = %category.slug,
                    product_key = %key,
                    price_text = %item.price_text,
                    error = %e,
                    "skipping item with invalid price"
                );
                None
            }
        };

        let movement = match (price, previous.get(key)) {
            (None, _) => PriceMovement::Unpriced,
            (Some(_), None) => PriceMovement::New,
            (Some(p), Some(prev)) if p < prev.price => PriceMovement::Dropped {
                previous: prev.price,
            },
            (Some(p), Some(prev)) if p > prev.price => PriceMovement::Raised {
                previous: prev.price,
            },
            (Some(_), Some(_)) => PriceMovement::Unchanged,
        };

        let snapshot = |price: i64| ProductSnapshot {
            key: key.clone(),
            title: item.title.clone(),
            price,
            link: item.link.clone(),
            image: item.image.clone(),
        };

        match (movement, price) {
            (PriceMovement::Unpriced, _) => counts.invalid += 1,
            (PriceMovement::New, Some(p)) => {
                counts.new += 1;
                events.push(ChangeEvent {
                    kind: ChangeKind::New,
                    category_slug: category.slug.clone(),
                    product: snapshot(p),
                    previous_price: None,
                    percent_change: None,
                });
            }
            (PriceMovement::Dropped { previous }, Some(p)) => {
                counts.dropped += 1;
                let pct = percent_drop(previous, p);
                if pct >= category.discount_threshold {
                    events.push(ChangeEvent {
                        kind: ChangeKind::PriceDrop,
                        category_slug: category.slug.clone(),
                        product: snapshot(p),
                        previous_price: Some(previous),
                        percent_change: Some(pct.round_dp(2)),
                    });
                } else {
                    tracing::debug!(
                        category = %category.slug,
                        product_key = %key,
                        previous,
                        price = p,
                        percent = %pct.round_dp(2),
                        "price drop below notification threshold"
                    );
                }
            }
            (PriceMovement::Raised { .. }, _) => counts.raised += 1,
            (PriceMovement::Unchanged, _) => counts.unchanged += 1,
            // Every priced movement carries `Some(price)`.
            (PriceMovement::New | PriceMovement::Dropped { .. }, None) => {}
        }

        observed.push(ObservedProduct {
            key: key.clone(),
            title: item.title.clone(),
            link: item.link.clone(),
            image: item.image.clone(),
            price,
            movement,
        });
    }

    let seen: HashSet<&ProductKey> = order.iter().collect();
    let mut missing: Vec<ProductKey> = previous
        .values()
        .filter(|p| p.status == ProductStatus::Active && !seen.contains(&p.key))
        .map(|p| p.key.clone())
        .collect();
    missing.sort();

    counts.missing = u32::try_from(missing.len()).unwrap_or(u32::MAX);
    counts.notifiable = u32::try_from(events.len()).unwrap_or(u32::MAX);

    CategoryDelta {
        category_slug: category.slug.clone(),
        observed,
        missing,
        events,
        counts,
    }
}
