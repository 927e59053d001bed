mod categories;
mod cycle;
mod daemon;
mod history;
mod wiring;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use pricewatch_core::{AppConfig, CategoryConfig};
use pricewatch_db::PgCatalogStore;
use pricewatch_notify::OutgoingMessage;
use tracing_subscriber::EnvFilter;

use crate::cycle::{run_cycle, CategoryOutcome, CycleOptions};
use crate::daemon::{run_daemon, Daemon};

#[derive(Debug, Parser)]
#[command(name = "pricewatch")]
#[command(about = "Category price crawler and price-drop notifier")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one crawl cycle and exit
    Run {
        /// Crawl only this category slug
        #[arg(long)]
        category: Option<String>,
    },
    /// Crawl on a schedule until interrupted
    Daemon,
    /// Retry every entry of the dead-letter log once
    RetryFailed,
    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Manage crawled categories
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Show a product's price history
    History {
        product_key: String,
        #[arg(long, default_value_t = 30)]
        limit: i64,
    },
    /// Send a test message through the configured chat transport
    TestNotify {
        #[arg(long, default_value = "pricewatch test notification")]
        message: String,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[derive(Debug, Subcommand)]
enum CategoryCommands {
    List,
    /// Upsert the categories declared in the categories file
    Sync,
    /// Add or update one category
    Add {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
        /// Percent drop that triggers a notification
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,
    },
    Deactivate {
        slug: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("pricewatch: no command given; see --help");
        return Ok(());
    };

    dotenvy::dotenv().ok();
    let config = pricewatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Commands that never touch the database.
    if let Commands::TestNotify { message } = &command {
        return test_notify(&config, message).await;
    }
    if matches!(command, Commands::RetryFailed) {
        return retry_failed(&config).await;
    }

    let pool_config = pricewatch_db::PoolConfig::from_app_config(&config);
    let pool = pricewatch_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            pricewatch_db::ping(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = pricewatch_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
        }
        other => {
            pricewatch_db::run_migrations(&pool).await?;
            run_command(other, pool, &config).await?;
        }
    }

    Ok(())
}

async fn run_command(command: Commands, pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Run { category } => {
            let shape = wiring::load_page_shape(config)?;
            let crawler = wiring::build_crawler(config, shape)?;
            let dispatcher = wiring::build_dispatcher(config)?;
            let store = PgCatalogStore::new(pool);
            let mut options = CycleOptions::from_app_config(config);
            options.category_filter = category;

            let summary = run_cycle(&store, &crawler, &dispatcher, &options).await?;
            for outcome in &summary.outcomes {
                match outcome {
                    CategoryOutcome::Succeeded(s) => println!(
                        "  {}: {} new, {} changed, {} unchanged, {} failed, {} deactivated",
                        s.category, s.new, s.changed, s.unchanged, s.failed, s.deactivated
                    ),
                    CategoryOutcome::Failed { category, error } => {
                        println!("  {category}: failed: {error}");
                    }
                    CategoryOutcome::Skipped { category } => {
                        println!("  {category}: skipped");
                    }
                }
            }
            println!(
                "cycle finished: {} succeeded, {} failed, {} skipped",
                summary.succeeded(),
                summary.failed(),
                summary.skipped()
            );
        }
        Commands::Daemon => {
            let shape = wiring::load_page_shape(config)?;
            let daemon = Daemon::new(
                Arc::new(PgCatalogStore::new(pool)),
                wiring::build_crawler(config, shape)?,
                wiring::build_dispatcher(config)?,
                CycleOptions::from_app_config(config),
            );
            run_daemon(Arc::new(daemon), config).await?;
        }
        Commands::Categories { command } => match command {
            CategoryCommands::List => categories::list(&pool).await?,
            CategoryCommands::Sync => categories::sync(&pool, config).await?,
            CategoryCommands::Add {
                slug,
                title,
                url,
                threshold,
            } => {
                let entry = CategoryConfig {
                    slug,
                    title,
                    url,
                    discount_threshold: threshold,
                    active: true,
                };
                categories::add(&pool, config, entry).await?;
            }
            CategoryCommands::Deactivate { slug } => categories::deactivate(&pool, &slug).await?,
        },
        Commands::History { product_key, limit } => {
            history::show(&pool, &product_key, limit.max(1)).await?;
        }
        Commands::Db { .. } | Commands::RetryFailed | Commands::TestNotify { .. } => {}
    }
    Ok(())
}

async fn retry_failed(config: &AppConfig) -> anyhow::Result<()> {
    let dispatcher = wiring::build_dispatcher(config)?;
    let report = dispatcher.retry_dead_letters().await?;
    println!(
        "retried {} notifications: {} delivered, {} requeued, {} dropped",
        report.attempted, report.delivered, report.requeued, report.dropped
    );
    Ok(())
}

async fn test_notify(config: &AppConfig, message: &str) -> anyhow::Result<()> {
    let dispatcher = wiring::build_dispatcher(config)?;
    dispatcher
        .send_message(&OutgoingMessage::text(message))
        .await
        .map_err(|e| anyhow::anyhow!("test notification failed: {e}"))?;
    println!("test notification sent");
    Ok(())
}
