//! One crawl cycle: every active category is crawled, diffed against its
//! stored state, written in one transaction and then notified.
//!
//! A failing category is logged, recorded on its run row and skipped. It
//! never aborts the other categories; the next scheduled cycle retries it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use pricewatch_core::{
    detect_changes, resolve_product_key, AppConfig, CatalogStore, Category, ChangeEvent,
    PriceBounds, PriceMovement, ProductKey, RawItem, ResolvedItem, RunSummary,
};
use pricewatch_notify::Dispatcher;
use pricewatch_scraper::CategoryCrawler;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) struct CycleOptions {
    /// Crawl only this category slug.
    pub category_filter: Option<String>,
    pub max_concurrent: usize,
    pub inter_category_delay: Duration,
    pub global_timeout: Duration,
    pub price_bounds: PriceBounds,
    /// Once set, categories not yet started are skipped. A category already
    /// running still commits and notifies.
    pub stop: Arc<AtomicBool>,
}

impl CycleOptions {
    pub(crate) fn from_app_config(config: &AppConfig) -> Self {
        Self {
            category_filter: None,
            max_concurrent: config.max_concurrent_categories.max(1),
            inter_category_delay: Duration::from_millis(config.inter_category_delay_ms),
            global_timeout: config.global_timeout(),
            price_bounds: config.price_bounds(),
            stop: Arc::default(),
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CategoryOutcome {
    Succeeded(RunSummary),
    Failed { category: String, error: String },
    /// Not started because the cycle budget was spent or a stop was requested.
    Skipped { category: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CycleSummary {
    pub outcomes: Vec<CategoryOutcome>,
}

impl CycleSummary {
    pub(crate) fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CategoryOutcome::Succeeded(_)))
            .count()
    }

    pub(crate) fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CategoryOutcome::Failed { .. }))
            .count()
    }

    pub(crate) fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CategoryOutcome::Skipped { .. }))
            .count()
    }
}

/// Runs one full cycle over the active categories.
///
/// # Errors
///
/// Returns an error only if the category list cannot be loaded or the
/// requested category filter matches no active category. Per-category
/// failures are reported in the summary.
pub(crate) async fn run_cycle(
    store: &dyn CatalogStore,
    crawler: &CategoryCrawler,
    dispatcher: &Dispatcher,
    options: &CycleOptions,
) -> anyhow::Result<CycleSummary> {
    let mut categories = store
        .active_categories()
        .await
        .context("failed to load active categories")?;

    if let Some(slug) = &options.category_filter {
        categories.retain(|c| &c.slug == slug);
        if categories.is_empty() {
            anyhow::bail!("category '{slug}' is not an active category");
        }
    }

    if categories.is_empty() {
        tracing::warn!("no active categories; nothing to crawl");
        return Ok(CycleSummary::default());
    }

    let deadline = Instant::now() + options.global_timeout;
    tracing::info!(
        categories = categories.len(),
        max_concurrent = options.max_concurrent,
        budget_secs = options.global_timeout.as_secs(),
        "crawl cycle started"
    );

    let outcomes: Vec<CategoryOutcome> = stream::iter(categories.into_iter().enumerate())
        .map(|(index, category)| async move {
            let pace = index > 0 && !options.inter_category_delay.is_zero();
            if pace && !options.stop_requested() {
                tokio::time::sleep(options.inter_category_delay).await;
            }
            if options.stop_requested() {
                tracing::info!(category = %category.slug, "stop requested, skipping category");
                return CategoryOutcome::Skipped {
                    category: category.slug,
                };
            }
            if Instant::now() >= deadline {
                tracing::warn!(category = %category.slug, "crawl budget spent, skipping category");
                return CategoryOutcome::Skipped {
                    category: category.slug,
                };
            }
            run_category(store, crawler, dispatcher, options, &category, deadline).await
        })
        .buffer_unordered(options.max_concurrent)
        .collect()
        .await;

    let flushed = dispatcher.flush().await;
    if flushed.delivered + flushed.dead_lettered > 0 {
        tracing::info!(
            delivered = flushed.delivered,
            dead_lettered = flushed.dead_lettered,
            "end-of-cycle notification flush"
        );
    }

    let summary = CycleSummary { outcomes };
    tracing::info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        skipped = summary.skipped(),
        "crawl cycle finished"
    );
    Ok(summary)
}

async fn run_category(
    store: &dyn CatalogStore,
    crawler: &CategoryCrawler,
    dispatcher: &Dispatcher,
    options: &CycleOptions,
    category: &Category,
    deadline: Instant,
) -> CategoryOutcome {
    let slug = category.slug.as_str();
    let run_id = match store.record_run_started(slug).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(category = slug, error = %e, "failed to record run start");
            None
        }
    };
    tracing::info!(category = slug, run_id, "category run started");

    match crawl_and_apply(store, crawler, options, category, deadline).await {
        Ok((summary, events)) => {
            if let Some(run_id) = run_id {
                if let Err(e) = store.record_run_succeeded(run_id, &summary).await {
                    tracing::warn!(category = slug, run_id, error = %e, "failed to record run end");
                }
            }
            tracing::info!(
                category = slug,
                new = summary.new,
                changed = summary.changed,
                unchanged = summary.unchanged,
                failed = summary.failed,
                deactivated = summary.deactivated,
                events = events.len(),
                "category run finished"
            );

            // The category transaction has committed; notifying is now safe.
            let report = dispatcher.dispatch(events).await;
            if report.dead_lettered > 0 {
                tracing::warn!(
                    category = slug,
                    dead_lettered = report.dead_lettered,
                    "some notifications were dead-lettered"
                );
            }
            CategoryOutcome::Succeeded(summary)
        }
        Err(e) => {
            let error = format!("{e:#}");
            if let Some(run_id) = run_id {
                if let Err(store_err) = store.record_run_failed(run_id, &error).await {
                    tracing::warn!(category = slug, run_id, error = %store_err, "failed to record run failure");
                }
            }
            tracing::error!(category = slug, error = %error, "category run failed");
            CategoryOutcome::Failed {
                category: category.slug.clone(),
                error,
            }
        }
    }
}

async fn crawl_and_apply(
    store: &dyn CatalogStore,
    crawler: &CategoryCrawler,
    options: &CycleOptions,
    category: &Category,
    deadline: Instant,
) -> anyhow::Result<(RunSummary, Vec<ChangeEvent>)> {
    let slug = category.slug.as_str();
    let report = crawler.crawl(category, deadline).await.context("crawl failed")?;

    let (resolved, unresolved) = resolve_items(slug, report.items);
    let previous = store
        .previous_state(slug)
        .await
        .context("failed to load previous state")?;

    let mut delta = detect_changes(category, &resolved, &previous, &options.price_bounds);
    if !report.complete && !delta.missing.is_empty() {
        tracing::warn!(
            category = slug,
            missing = delta.missing.len(),
            skipped_pages = ?report.skipped_pages,
            "crawl did not cover the whole listing, keeping unseen products active"
        );
        delta.missing.clear();
        delta.counts.missing = 0;
    }

    let outcome = store
        .apply_category_run(&delta)
        .await
        .context("failed to persist category run")?;
    tracing::debug!(category = slug, ?outcome, "category run persisted");

    // Another category owns these rows; it reports their events itself.
    if !outcome.skipped_foreign.is_empty() {
        let foreign: HashSet<&ProductKey> = outcome.skipped_foreign.iter().collect();
        let before = delta.events.len();
        delta.events.retain(|event| !foreign.contains(&event.product.key));
        tracing::info!(
            category = slug,
            foreign = foreign.len(),
            dropped_events = before - delta.events.len(),
            "products owned by another category were not written"
        );
        let foreign_new = delta
            .observed
            .iter()
            .filter(|p| matches!(p.movement, PriceMovement::New) && foreign.contains(&p.key))
            .count();
        delta.counts.new = delta
            .counts
            .new
            .saturating_sub(u32::try_from(foreign_new).unwrap_or(u32::MAX));
    }

    let summary = RunSummary {
        category: category.slug.clone(),
        new: delta.counts.new,
        changed: delta.counts.changed(),
        unchanged: delta.counts.unchanged,
        failed: delta.counts.invalid + unresolved,
        deactivated: outcome.deactivated,
    };
    Ok((summary, delta.events))
}

/// Resolves product keys, returning the resolved items and how many had to
/// be dropped.
fn resolve_items(slug: &str, items: Vec<RawItem>) -> (Vec<ResolvedItem>, u32) {
    let mut resolved = Vec::with_capacity(items.len());
    let mut unresolved = 0u32;
    for item in items {
        match resolve_product_key(&item.link) {
            Ok(key) => resolved.push(ResolvedItem { key, item }),
            Err(e) => {
                tracing::warn!(category = slug, title = %item.title, error = %e, "item has no usable identity");
                unresolved += 1;
            }
        }
    }
    (resolved, unresolved)
}

#[cfg(test)]
pub(crate) mod memory_store;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "cycle_test.rs"]
mod tests;
