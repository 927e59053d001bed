//! Postgres-backed [`CatalogStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use pricewatch_core::{
    ApplyOutcome, CatalogStore, Category, CategoryDelta, PreviousProduct, ProductKey, RunId,
    RunSummary, StoreError,
};
use sqlx::PgPool;

use crate::{categories, crawl_runs, products, DbError};

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn read_err(e: DbError) -> StoreError {
    StoreError::Read(e.to_string())
}

fn write_err(e: DbError) -> StoreError {
    StoreError::PersistenceFailed(e.to_string())
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn active_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = categories::list_active_categories(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn previous_state(
        &self,
        category_slug: &str,
    ) -> Result<HashMap<ProductKey, PreviousProduct>, StoreError> {
        products::load_previous_state(&self.pool, category_slug)
            .await
            .map_err(read_err)
    }

    async fn apply_category_run(&self, delta: &CategoryDelta) -> Result<ApplyOutcome, StoreError> {
        products::apply_category_run(&self.pool, delta)
            .await
            .map_err(write_err)
    }

    async fn record_run_started(&self, category_slug: &str) -> Result<RunId, StoreError> {
        crawl_runs::start_crawl_run(&self.pool, category_slug)
            .await
            .map_err(write_err)
    }

    async fn record_run_succeeded(
        &self,
        run_id: RunId,
        summary: &RunSummary,
    ) -> Result<(), StoreError> {
        crawl_runs::complete_crawl_run(&self.pool, run_id, summary)
            .await
            .map_err(write_err)
    }

    async fn record_run_failed(
        &self,
        run_id: RunId,
        error_message: &str,
    ) -> Result<(), StoreError> {
        crawl_runs::fail_crawl_run(&self.pool, run_id, error_message)
            .await
            .map_err(write_err)
    }
}
