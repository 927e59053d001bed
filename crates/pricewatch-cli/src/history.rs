//! Price history lookup by product key.

use pricewatch_notify::format_price;
use sqlx::PgPool;

pub(crate) async fn show(pool: &PgPool, product_key: &str, limit: i64) -> anyhow::Result<()> {
    let key = product_key.trim();
    let product = pricewatch_db::get_product(pool, key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product '{key}' not found"))?;

    println!("{} [{}]", product.title, product.product_key);
    println!("  category: {}", product.category_slug);
    println!("  status:   {}", product.status);
    println!("  price:    {}", format_price(product.price));
    println!("  lowest:   {}", format_price(product.lowest_price));
    println!("  seen:     {} .. {}", product.first_seen_at, product.last_seen_at);
    println!("  link:     {}", product.link);

    if let Some(latest) = pricewatch_db::latest_price(pool, key).await? {
        println!(
            "  sampled:  {} at {}",
            format_price(latest.price),
            latest.observed_at.format("%Y-%m-%d %H:%M")
        );
    }

    let samples = pricewatch_db::price_history(pool, key, limit).await?;
    println!("history ({} samples):", samples.len());
    for sample in samples {
        println!(
            "  {}  {}",
            sample.observed_at.format("%Y-%m-%d %H:%M"),
            format_price(sample.price)
        );
    }
    Ok(())
}
