//! Builds the crawler and the dispatcher from [`AppConfig`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pricewatch_core::{AppConfig, ConfigError, PageShape};
use pricewatch_notify::{
    ChangeLog, ChatTransport, Dispatcher, DispatcherSettings, JsonFileDeadLetters, LogTransport,
    TelegramTransport,
};
use pricewatch_scraper::{
    CategoryCrawler, CrawlSettings, FetchSettings, HttpRenderer, PageFetcher, RendererSettings,
    SelectorExtractor,
};

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Page shape from the categories file. A missing file means the built-in
/// layout; a file that exists but does not parse or validate is an error.
pub(crate) fn load_page_shape(config: &AppConfig) -> anyhow::Result<PageShape> {
    page_shape_from(&config.categories_path)
}

fn page_shape_from(path: &Path) -> anyhow::Result<PageShape> {
    match pricewatch_core::load_categories(path) {
        Ok(file) => Ok(file.page_shape()),
        Err(ConfigError::CategoriesFileIo { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            tracing::info!(
                path = %path.display(),
                "no categories file, using built-in page shape"
            );
            Ok(PageShape::default())
        }
        Err(e) => Err(e).with_context(|| format!("invalid categories file {}", path.display())),
    }
}

pub(crate) fn build_crawler(config: &AppConfig, shape: PageShape) -> anyhow::Result<CategoryCrawler> {
    let renderer = HttpRenderer::new(RendererSettings {
        user_agent: config.user_agent.clone(),
        accept_language: config.accept_language.clone(),
        ..RendererSettings::default()
    })
    .context("failed to build HTTP renderer")?;
    let extractor = SelectorExtractor::new(&shape).context("invalid page shape selector")?;
    let fetcher = PageFetcher::new(Arc::new(renderer), FetchSettings::from_app_config(config));

    Ok(CategoryCrawler::new(
        fetcher,
        Arc::new(extractor),
        shape,
        CrawlSettings::from_app_config(config),
    ))
}

/// Telegram when both credentials are configured, otherwise a transport that
/// only logs.
pub(crate) fn build_transport(config: &AppConfig) -> anyhow::Result<Arc<dyn ChatTransport>> {
    match config.telegram_credentials() {
        Some((token, chat_id)) => {
            let transport = TelegramTransport::new(
                &config.telegram_api_base,
                token,
                chat_id,
                TELEGRAM_TIMEOUT,
            )
            .context("failed to build Telegram client")?;
            Ok(Arc::new(transport))
        }
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set; notifications will only be logged");
            Ok(Arc::new(LogTransport))
        }
    }
}

pub(crate) fn build_dispatcher(config: &AppConfig) -> anyhow::Result<Dispatcher> {
    let transport = build_transport(config)?;
    let dead_letters = Arc::new(JsonFileDeadLetters::new(config.dead_letter_path.clone()));
    let dispatcher = Dispatcher::new(
        transport,
        dead_letters,
        DispatcherSettings::from_app_config(config),
    );

    Ok(match &config.change_log_path {
        Some(path) => dispatcher.with_change_log(ChangeLog::new(path.clone())),
        None => dispatcher,
    })
}

#[cfg(test)]
#[path = "wiring_test.rs"]
mod tests;
