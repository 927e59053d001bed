//! Database operations for the `categories` table.

use chrono::{DateTime, Utc};
use pricewatch_core::Category;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub url: String,
    pub discount_threshold: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            slug: row.slug,
            title: row.title,
            url: row.url,
            discount_threshold: row.discount_threshold,
            is_active: row.is_active,
        }
    }
}

const CATEGORY_COLUMNS: &str =
    "id, slug, title, url, discount_threshold, is_active, created_at, updated_at";

/// Returns all active categories ordered by slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE is_active = TRUE ORDER BY slug"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every category, active or not, ordered by slug.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY slug"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Inserts or updates a category by slug. Returns the row id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_category(pool: &PgPool, category: &Category) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO categories (slug, title, url, discount_threshold, is_active) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (slug) DO UPDATE SET \
             title              = EXCLUDED.title, \
             url                = EXCLUDED.url, \
             discount_threshold = EXCLUDED.discount_threshold, \
             is_active          = EXCLUDED.is_active, \
             updated_at         = NOW() \
         RETURNING id",
    )
    .bind(&category.slug)
    .bind(&category.title)
    .bind(&category.url)
    .bind(category.discount_threshold)
    .bind(category.is_active)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Soft-deletes a category. Its products keep their category reference.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no category has the slug, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn deactivate_category(pool: &PgPool, slug: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE categories SET is_active = FALSE, updated_at = NOW() WHERE slug = $1",
    )
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Upserts every category from the configuration file.
///
/// Returns the number of categories processed. All upserts run inside a
/// single transaction; if any fails the whole batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn sync_categories(pool: &PgPool, categories: &[Category]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;

    for category in categories {
        sqlx::query(
            "INSERT INTO categories (slug, title, url, discount_threshold, is_active) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (slug) DO UPDATE SET \
                 title              = EXCLUDED.title, \
                 url                = EXCLUDED.url, \
                 discount_threshold = EXCLUDED.discount_threshold, \
                 is_active          = EXCLUDED.is_active, \
                 updated_at         = NOW()",
        )
        .bind(&category.slug)
        .bind(&category.title)
        .bind(&category.url)
        .bind(category.discount_threshold)
        .bind(category.is_active)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(categories.len())
}
