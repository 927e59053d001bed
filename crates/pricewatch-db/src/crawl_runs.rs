//! Database operations for `crawl_runs`.
//!
//! Each category crawl creates one row in `running` status, then moves it to
//! `succeeded` (with counts) or `failed` (with an error message).

use chrono::{DateTime, Utc};
use pricewatch_core::RunSummary;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `crawl_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrawlRunRow {
    pub id: i64,
    pub category_slug: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub new_count: i32,
    pub changed_count: i32,
    pub unchanged_count: i32,
    pub failed_count: i32,
    pub deactivated_count: i32,
    pub error_message: Option<String>,
}

const RUN_COLUMNS: &str = "id, category_slug, status, started_at, completed_at, \
     new_count, changed_count, unchanged_count, failed_count, deactivated_count, error_message";

fn count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

// ---------------------------------------------------------------------------
// crawl_runs operations
// ---------------------------------------------------------------------------

/// Creates a run in `running` status and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn start_crawl_run(pool: &PgPool, category_slug: &str) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO crawl_runs (category_slug, status) VALUES ($1, 'running') RETURNING id",
    )
    .bind(category_slug)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Marks a run as `succeeded` and records its counts.
///
/// # Errors
///
/// Returns [`DbError::InvalidCrawlRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_crawl_run(
    pool: &PgPool,
    id: i64,
    summary: &RunSummary,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE crawl_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             new_count = $1, changed_count = $2, unchanged_count = $3, \
             failed_count = $4, deactivated_count = $5 \
         WHERE id = $6 AND status = 'running'",
    )
    .bind(count(summary.new))
    .bind(count(summary.changed))
    .bind(count(summary.unchanged))
    .bind(count(summary.failed))
    .bind(count(summary.deactivated))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCrawlRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed` with an error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidCrawlRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_crawl_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE crawl_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCrawlRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has the id, or [`DbError::Sqlx`].
pub async fn get_crawl_run(pool: &PgPool, id: i64) -> Result<CrawlRunRow, DbError> {
    sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM crawl_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_crawl_runs(pool: &PgPool, limit: i64) -> Result<Vec<CrawlRunRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM crawl_runs ORDER BY started_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
