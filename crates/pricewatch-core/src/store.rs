//! The persistence seam consumed by the crawl cycle.
//!
//! `pricewatch-db` implements [`CatalogStore`] on Postgres; tests use an
//! in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::detect::CategoryDelta;
use crate::model::{Category, PreviousProduct, ProductKey, RunSummary};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A category write failed and was rolled back.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("store read failed: {0}")]
    Read(String),
}

/// Identifier of a `crawl_runs` record.
pub type RunId = i64;

/// Row counts written by [`CatalogStore::apply_category_run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub inserted: u32,
    pub updated: u32,
    /// Seen with an unchanged price; only status and last-seen were touched.
    pub refreshed: u32,
    pub deactivated: u32,
    pub samples_appended: u32,
    /// Keys already owned by another category; left untouched. Their
    /// events must not be sent.
    pub skipped_foreign: Vec<ProductKey>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Categories the crawl cycle should visit.
    async fn active_categories(&self) -> Result<Vec<Category>, StoreError>;

    /// Last persisted state of every product in the category.
    async fn previous_state(
        &self,
        category_slug: &str,
    ) -> Result<HashMap<ProductKey, PreviousProduct>, StoreError>;

    /// Writes the whole delta for one category atomically.
    ///
    /// Either every product row, price sample and status flip in `delta` is
    /// committed, or none is.
    async fn apply_category_run(&self, delta: &CategoryDelta) -> Result<ApplyOutcome, StoreError>;

    async fn record_run_started(&self, category_slug: &str) -> Result<RunId, StoreError>;

    async fn record_run_succeeded(
        &self,
        run_id: RunId,
        summary: &RunSummary,
    ) -> Result<(), StoreError>;

    async fn record_run_failed(&self, run_id: RunId, error_message: &str)
        -> Result<(), StoreError>;
}
