//! In-memory [`CatalogStore`] used by the cycle tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use pricewatch_core::{
    ApplyOutcome, CatalogStore, Category, CategoryDelta, PreviousProduct, ProductKey,
    ProductStatus, RunId, RunSummary, StoreError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredProduct {
    pub category_slug: String,
    pub title: String,
    pub price: i64,
    pub lowest_price: i64,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunRecord {
    Running,
    Succeeded(RunSummary),
    Failed(String),
}

#[derive(Default)]
struct State {
    categories: Vec<Category>,
    products: HashMap<ProductKey, StoredProduct>,
    samples: Vec<(ProductKey, i64)>,
    runs: Vec<(String, RunRecord)>,
    fail_apply: bool,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub(crate) fn new(categories: Vec<Category>) -> Self {
        Self {
            state: Mutex::new(State {
                categories,
                ..State::default()
            }),
        }
    }

    pub(crate) fn product(&self, key: &str) -> Option<StoredProduct> {
        self.state
            .lock()
            .unwrap()
            .products
            .get(&ProductKey::new(key))
            .cloned()
    }

    pub(crate) fn samples(&self, key: &str) -> Vec<i64> {
        self.state
            .lock()
            .unwrap()
            .samples
            .iter()
            .filter(|(k, _)| k.as_str() == key)
            .map(|(_, price)| *price)
            .collect()
    }

    pub(crate) fn runs(&self) -> Vec<(String, RunRecord)> {
        self.state.lock().unwrap().runs.clone()
    }

    pub(crate) fn fail_next_apply(&self) {
        self.state.lock().unwrap().fail_apply = true;
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn active_categories(&self) -> Result<Vec<Category>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .categories
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn previous_state(
        &self,
        category_slug: &str,
    ) -> Result<HashMap<ProductKey, PreviousProduct>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .products
            .iter()
            .filter(|(_, p)| p.category_slug == category_slug)
            .map(|(key, p)| {
                (
                    key.clone(),
                    PreviousProduct {
                        key: key.clone(),
                        price: p.price,
                        lowest_price: p.lowest_price,
                        status: p.status,
                    },
                )
            })
            .collect())
    }

    async fn apply_category_run(&self, delta: &CategoryDelta) -> Result<ApplyOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_apply) {
            return Err(StoreError::PersistenceFailed("injected failure".to_string()));
        }

        // Stage on a copy so a failure leaves nothing behind.
        let mut products = state.products.clone();
        let mut samples = Vec::new();
        let mut outcome = ApplyOutcome::default();

        for observed in &delta.observed {
            let Some(price) = observed.price else {
                continue;
            };
            match products.get_mut(&observed.key) {
                Some(existing) if existing.category_slug != delta.category_slug => {
                    outcome.skipped_foreign.push(observed.key.clone());
                }
                Some(existing) => {
                    let changed = existing.price != price;
                    existing.title.clone_from(&observed.title);
                    existing.price = price;
                    existing.lowest_price = existing.lowest_price.min(price);
                    existing.status = ProductStatus::Active;
                    if changed {
                        outcome.updated += 1;
                        samples.push((observed.key.clone(), price));
                    } else {
                        outcome.refreshed += 1;
                    }
                }
                None => {
                    products.insert(
                        observed.key.clone(),
                        StoredProduct {
                            category_slug: delta.category_slug.clone(),
                            title: observed.title.clone(),
                            price,
                            lowest_price: price,
                            status: ProductStatus::Active,
                        },
                    );
                    outcome.inserted += 1;
                    samples.push((observed.key.clone(), price));
                }
            }
        }

        for key in &delta.missing {
            if let Some(p) = products.get_mut(key) {
                if p.category_slug == delta.category_slug && p.status == ProductStatus::Active {
                    p.status = ProductStatus::Inactive;
                    outcome.deactivated += 1;
                }
            }
        }

        outcome.samples_appended = u32::try_from(samples.len()).unwrap_or(u32::MAX);
        state.products = products;
        state.samples.extend(samples);
        Ok(outcome)
    }

    async fn record_run_started(&self, category_slug: &str) -> Result<RunId, StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .runs
            .push((category_slug.to_string(), RunRecord::Running));
        Ok(RunId::try_from(state.runs.len()).unwrap_or(RunId::MAX))
    }

    async fn record_run_succeeded(
        &self,
        run_id: RunId,
        summary: &RunSummary,
    ) -> Result<(), StoreError> {
        self.finish(run_id, RunRecord::Succeeded(summary.clone()))
    }

    async fn record_run_failed(
        &self,
        run_id: RunId,
        error_message: &str,
    ) -> Result<(), StoreError> {
        self.finish(run_id, RunRecord::Failed(error_message.to_string()))
    }
}

impl MemoryStore {
    fn finish(&self, run_id: RunId, record: RunRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let index = usize::try_from(run_id - 1)
            .map_err(|_| StoreError::Read(format!("unknown run {run_id}")))?;
        let slot = state
            .runs
            .get_mut(index)
            .ok_or_else(|| StoreError::Read(format!("unknown run {run_id}")))?;
        slot.1 = record;
        Ok(())
    }
}
