//! Category administration commands.

use anyhow::Context;
use pricewatch_core::categories::validate_category;
use pricewatch_core::{AppConfig, Category, CategoryConfig};
use sqlx::PgPool;

pub(crate) async fn list(pool: &PgPool) -> anyhow::Result<()> {
    let rows = pricewatch_db::list_categories(pool).await?;
    if rows.is_empty() {
        println!("no categories; run `pricewatch categories sync` first");
        return Ok(());
    }

    for row in rows {
        let state = if row.is_active { "active" } else { "inactive" };
        println!(
            "{:<40} {:<8} {:>6}%  {}",
            row.slug, state, row.discount_threshold, row.url
        );
    }
    Ok(())
}

/// Upserts every category declared in the categories file.
pub(crate) async fn sync(pool: &PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let file = pricewatch_core::load_categories(&config.categories_path).with_context(|| {
        format!(
            "failed to load categories from {}",
            config.categories_path.display()
        )
    })?;
    let categories: Vec<Category> = file
        .categories
        .into_iter()
        .map(|c| c.into_category(config.default_discount_threshold))
        .collect();

    let count = pricewatch_db::sync_categories(pool, &categories).await?;
    tracing::info!(count, path = %config.categories_path.display(), "categories synced");
    println!("synced {count} categories");
    Ok(())
}

pub(crate) async fn add(
    pool: &PgPool,
    config: &AppConfig,
    entry: CategoryConfig,
) -> anyhow::Result<()> {
    validate_category(&entry)?;
    let category = entry.into_category(config.default_discount_threshold);
    let id = pricewatch_db::upsert_category(pool, &category).await?;
    tracing::info!(id, slug = %category.slug, "category saved");
    println!(
        "saved category '{}' (threshold {}%)",
        category.slug, category.discount_threshold
    );
    Ok(())
}

pub(crate) async fn deactivate(pool: &PgPool, slug: &str) -> anyhow::Result<()> {
    match pricewatch_db::deactivate_category(pool, slug).await {
        Ok(()) => {
            println!("deactivated category '{slug}'");
            Ok(())
        }
        Err(pricewatch_db::DbError::NotFound) => anyhow::bail!("category '{slug}' not found"),
        Err(e) => Err(e.into()),
    }
}
