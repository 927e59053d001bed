use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::price::PriceBounds;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// How qualifying change events reach the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Each event is sent as soon as its category's write has committed.
    Instant,
    /// Events are queued and flushed in bursts (size or age trigger).
    Batched,
}

impl std::fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyMode::Instant => write!(f, "instant"),
            NotifyMode::Batched => write!(f, "batched"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub categories_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub crawl_interval_secs: u64,
    pub global_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub pre_request_delay_min_ms: u64,
    pub pre_request_delay_max_ms: u64,
    pub inter_page_delay_ms: u64,
    pub inter_category_delay_ms: u64,
    pub fetch_max_attempts: u32,
    pub fetch_retry_delay_ms: u64,
    pub category_max_attempts: u32,
    pub category_retry_delay_ms: u64,
    pub max_concurrent_categories: usize,
    pub user_agent: Option<String>,
    pub accept_language: String,
    pub snapshot_dir: PathBuf,

    pub price_min: i64,
    pub price_max: i64,
    pub default_discount_threshold: Decimal,

    pub notify_mode: NotifyMode,
    pub notify_buffer_size: usize,
    pub notify_flush_interval_secs: u64,
    pub notify_send_delay_ms: u64,
    pub notify_max_attempts: u32,
    pub notify_retry_delay_ms: u64,
    pub dead_letter_path: PathBuf,
    pub dead_letter_max_retries: u32,
    pub change_log_path: Option<PathBuf>,
    pub telegram_api_base: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl AppConfig {
    #[must_use]
    pub fn price_bounds(&self) -> PriceBounds {
        PriceBounds {
            min: self.price_min,
            max: self.price_max,
        }
    }

    #[must_use]
    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }

    #[must_use]
    pub fn crawl_interval(&self) -> Duration {
        Duration::from_secs(self.crawl_interval_secs)
    }

    /// Returns the Telegram credentials when both token and chat id are set.
    #[must_use]
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Some((token.as_str(), chat_id.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("categories_path", &self.categories_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("crawl_interval_secs", &self.crawl_interval_secs)
            .field("global_timeout_secs", &self.global_timeout_secs)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("pre_request_delay_min_ms", &self.pre_request_delay_min_ms)
            .field("pre_request_delay_max_ms", &self.pre_request_delay_max_ms)
            .field("inter_page_delay_ms", &self.inter_page_delay_ms)
            .field("inter_category_delay_ms", &self.inter_category_delay_ms)
            .field("fetch_max_attempts", &self.fetch_max_attempts)
            .field("fetch_retry_delay_ms", &self.fetch_retry_delay_ms)
            .field("category_max_attempts", &self.category_max_attempts)
            .field("category_retry_delay_ms", &self.category_retry_delay_ms)
            .field("max_concurrent_categories", &self.max_concurrent_categories)
            .field("user_agent", &self.user_agent)
            .field("accept_language", &self.accept_language)
            .field("snapshot_dir", &self.snapshot_dir)
            .field("price_min", &self.price_min)
            .field("price_max", &self.price_max)
            .field(
                "default_discount_threshold",
                &self.default_discount_threshold,
            )
            .field("notify_mode", &self.notify_mode)
            .field("notify_buffer_size", &self.notify_buffer_size)
            .field(
                "notify_flush_interval_secs",
                &self.notify_flush_interval_secs,
            )
            .field("notify_send_delay_ms", &self.notify_send_delay_ms)
            .field("notify_max_attempts", &self.notify_max_attempts)
            .field("notify_retry_delay_ms", &self.notify_retry_delay_ms)
            .field("dead_letter_path", &self.dead_letter_path)
            .field("dead_letter_max_retries", &self.dead_letter_max_retries)
            .field("change_log_path", &self.change_log_path)
            .field("telegram_api_base", &self.telegram_api_base)
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| "[redacted]"),
            )
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}
