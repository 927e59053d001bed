//! Database operations for `products` and `price_samples`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pricewatch_core::{ApplyOutcome, CategoryDelta, PreviousProduct, ProductKey, ProductStatus};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub product_key: String,
    pub category_slug: String,
    pub title: String,
    pub price: i64,
    pub lowest_price: i64,
    pub link: String,
    pub image_url: Option<String>,
    /// `active` or `inactive`.
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `price_samples` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceSampleRow {
    pub id: i64,
    pub product_key: String,
    pub price: i64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct StateRow {
    product_key: String,
    price: i64,
    lowest_price: i64,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertResult {
    is_new: bool,
    previous_price: Option<i64>,
}

// ---------------------------------------------------------------------------
// Read path
// ---------------------------------------------------------------------------

/// Loads the last persisted state of every product in a category, keyed by
/// product key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidColumn`] if a row carries an unknown status.
pub async fn load_previous_state(
    pool: &PgPool,
    category_slug: &str,
) -> Result<HashMap<ProductKey, PreviousProduct>, DbError> {
    let rows = sqlx::query_as::<_, StateRow>(
        "SELECT product_key, price, lowest_price, status \
         FROM products \
         WHERE category_slug = $1",
    )
    .bind(category_slug)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let status = row
                .status
                .parse::<ProductStatus>()
                .map_err(|_| DbError::InvalidColumn {
                    column: "products.status",
                    value: row.status.clone(),
                })?;
            let key = ProductKey::new(row.product_key);
            Ok((
                key.clone(),
                PreviousProduct {
                    key,
                    price: row.price,
                    lowest_price: row.lowest_price,
                    status,
                },
            ))
        })
        .collect()
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, product_key: &str) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, product_key, category_slug, title, price, lowest_price, link, image_url, \
                status, first_seen_at, last_seen_at, updated_at \
         FROM products \
         WHERE product_key = $1",
    )
    .bind(product_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the most recent price sample for a product, if any.
///
/// Ordered by `observed_at DESC, id DESC` so ties on the timestamp still
/// resolve to the last write.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_price(
    pool: &PgPool,
    product_key: &str,
) -> Result<Option<PriceSampleRow>, DbError> {
    let row = sqlx::query_as::<_, PriceSampleRow>(
        "SELECT id, product_key, price, observed_at \
         FROM price_samples \
         WHERE product_key = $1 \
         ORDER BY observed_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(product_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns up to `limit` price samples for a product, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn price_history(
    pool: &PgPool,
    product_key: &str,
    limit: i64,
) -> Result<Vec<PriceSampleRow>, DbError> {
    let rows = sqlx::query_as::<_, PriceSampleRow>(
        "SELECT id, product_key, price, observed_at FROM ( \
             SELECT id, product_key, price, observed_at \
             FROM price_samples \
             WHERE product_key = $1 \
             ORDER BY observed_at DESC, id DESC \
             LIMIT $2 \
         ) recent \
         ORDER BY observed_at ASC, id ASC",
    )
    .bind(product_key)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Write path
// ---------------------------------------------------------------------------

/// Writes one category's crawl result in a single transaction.
///
/// For every priced product: upsert the row (lowest price only ever
/// decreases) and append a price sample when the product is new or its
/// stored price changed. Unpriced products only get `last_seen_at` bumped.
/// Keys listed in `delta.missing` are flipped to `inactive`; callers clear
/// that list when the crawl did not cover the whole listing.
///
/// A product key owned by another category is left untouched and listed in
/// `skipped_foreign`; a category's transaction never writes another
/// category's rows.
///
/// Any error rolls the whole transaction back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement or the commit fails.
pub async fn apply_category_run(
    pool: &PgPool,
    delta: &CategoryDelta,
) -> Result<ApplyOutcome, DbError> {
    let mut tx = pool.begin().await?;
    let mut outcome = ApplyOutcome::default();
    let slug = delta.category_slug.as_str();

    for product in &delta.observed {
        let Some(price) = product.price else {
            sqlx::query(
                "UPDATE products SET last_seen_at = NOW() \
                 WHERE product_key = $1 AND category_slug = $2",
            )
            .bind(product.key.as_str())
            .bind(slug)
            .execute(&mut *tx)
            .await?;
            continue;
        };

        // `prev` reads the pre-statement snapshot, so it sees the old price.
        let result = sqlx::query_as::<_, UpsertResult>(
            "WITH prev AS ( \
                 SELECT price FROM products WHERE product_key = $1 \
             ), upserted AS ( \
                 INSERT INTO products \
                     (product_key, category_slug, title, price, lowest_price, link, image_url, status) \
                 VALUES ($1, $2, $3, $4, $4, $5, $6, 'active') \
                 ON CONFLICT (product_key) DO UPDATE SET \
                     title        = EXCLUDED.title, \
                     price        = EXCLUDED.price, \
                     lowest_price = LEAST(products.lowest_price, EXCLUDED.price), \
                     link         = EXCLUDED.link, \
                     image_url    = COALESCE(EXCLUDED.image_url, products.image_url), \
                     status       = 'active', \
                     last_seen_at = NOW(), \
                     updated_at   = NOW() \
                 WHERE products.category_slug = EXCLUDED.category_slug \
                 RETURNING (xmax = 0) AS is_new \
             ) \
             SELECT upserted.is_new, prev.price AS previous_price \
             FROM upserted LEFT JOIN prev ON TRUE",
        )
        .bind(product.key.as_str())
        .bind(slug)
        .bind(&product.title)
        .bind(price)
        .bind(&product.link)
        .bind(&product.image)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(result) = result else {
            tracing::warn!(
                category = %slug,
                product_key = %product.key,
                "product key belongs to another category, skipping"
            );
            outcome.skipped_foreign.push(product.key.clone());
            continue;
        };

        let price_changed = result.previous_price != Some(price);
        if result.is_new {
            outcome.inserted += 1;
        } else if price_changed {
            outcome.updated += 1;
        } else {
            outcome.refreshed += 1;
        }

        if result.is_new || price_changed {
            sqlx::query(
                "INSERT INTO price_samples (product_key, price, observed_at) \
                 VALUES ($1, $2, NOW())",
            )
            .bind(product.key.as_str())
            .bind(price)
            .execute(&mut *tx)
            .await?;
            outcome.samples_appended += 1;
        }
    }

    if !delta.missing.is_empty() {
        let missing_keys: Vec<&str> = delta.missing.iter().map(ProductKey::as_str).collect();

        let rows_affected = sqlx::query(
            "UPDATE products \
             SET status = 'inactive', updated_at = NOW() \
             WHERE category_slug = $1 \
               AND status = 'active' \
               AND product_key = ANY($2::text[])",
        )
        .bind(slug)
        .bind(&missing_keys)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        outcome.deactivated = u32::try_from(rows_affected).unwrap_or(u32::MAX);
    }

    tx.commit().await?;
    Ok(outcome)
}
