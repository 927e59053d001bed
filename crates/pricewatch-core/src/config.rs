use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{AppConfig, Environment, NotifyMode};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a `HashMap`.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
#[allow(clippy::too_many_lines)]
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        or_default(var, default)
            .parse::<i64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    let positive_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let value = parse_u32(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1"));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("PRICEWATCH_ENV", "development"))?;
    let log_level = or_default("PRICEWATCH_LOG_LEVEL", "info");
    let categories_path = PathBuf::from(or_default(
        "PRICEWATCH_CATEGORIES_PATH",
        "./config/categories.yaml",
    ));

    let db_max_connections = parse_u32("PRICEWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PRICEWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("PRICEWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "PRICEWATCH_DB_MIN_CONNECTIONS",
            format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        ));
    }

    let crawl_interval_secs = parse_u64("PRICEWATCH_CRAWL_INTERVAL_SECS", "3600")?;
    if crawl_interval_secs == 0 {
        return Err(invalid("PRICEWATCH_CRAWL_INTERVAL_SECS", "must be at least 1"));
    }
    let global_timeout_secs = parse_u64("PRICEWATCH_GLOBAL_TIMEOUT_SECS", "1800")?;
    let page_timeout_secs = parse_u64("PRICEWATCH_PAGE_TIMEOUT_SECS", "30")?;
    let pre_request_delay_min_ms = parse_u64("PRICEWATCH_PRE_REQUEST_DELAY_MIN_MS", "800")?;
    let pre_request_delay_max_ms = parse_u64("PRICEWATCH_PRE_REQUEST_DELAY_MAX_MS", "2500")?;
    if pre_request_delay_min_ms > pre_request_delay_max_ms {
        return Err(invalid(
            "PRICEWATCH_PRE_REQUEST_DELAY_MIN_MS",
            format!(
                "min delay ({pre_request_delay_min_ms}) exceeds max delay ({pre_request_delay_max_ms})"
            ),
        ));
    }
    let inter_page_delay_ms = parse_u64("PRICEWATCH_INTER_PAGE_DELAY_MS", "2000")?;
    let inter_category_delay_ms = parse_u64("PRICEWATCH_INTER_CATEGORY_DELAY_MS", "5000")?;
    let fetch_max_attempts = positive_u32("PRICEWATCH_FETCH_MAX_ATTEMPTS", "3")?;
    let fetch_retry_delay_ms = parse_u64("PRICEWATCH_FETCH_RETRY_DELAY_MS", "5000")?;
    let category_max_attempts = positive_u32("PRICEWATCH_CATEGORY_MAX_ATTEMPTS", "3")?;
    let category_retry_delay_ms = parse_u64("PRICEWATCH_CATEGORY_RETRY_DELAY_MS", "5000")?;
    let max_concurrent_categories = parse_usize("PRICEWATCH_MAX_CONCURRENT_CATEGORIES", "1")?;
    if max_concurrent_categories == 0 {
        return Err(invalid(
            "PRICEWATCH_MAX_CONCURRENT_CATEGORIES",
            "must be at least 1",
        ));
    }
    let user_agent = optional("PRICEWATCH_USER_AGENT");
    let accept_language = or_default(
        "PRICEWATCH_ACCEPT_LANGUAGE",
        "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7",
    );
    let snapshot_dir = PathBuf::from(or_default("PRICEWATCH_SNAPSHOT_DIR", "./data/snapshots"));

    let price_min = parse_i64("PRICEWATCH_PRICE_MIN", "1")?;
    let price_max = parse_i64("PRICEWATCH_PRICE_MAX", "1000000")?;
    if price_min < 1 {
        return Err(invalid("PRICEWATCH_PRICE_MIN", "must be at least 1"));
    }
    if price_min > price_max {
        return Err(invalid(
            "PRICEWATCH_PRICE_MIN",
            format!("min price ({price_min}) exceeds max price ({price_max})"),
        ));
    }
    let default_discount_threshold = parse_threshold(&or_default(
        "PRICEWATCH_DEFAULT_DISCOUNT_THRESHOLD",
        "10",
    ))?;

    let notify_mode = parse_notify_mode(&or_default("PRICEWATCH_NOTIFY_MODE", "instant"))?;
    let notify_buffer_size = parse_usize("PRICEWATCH_NOTIFY_BUFFER_SIZE", "10")?;
    if notify_buffer_size == 0 {
        return Err(invalid("PRICEWATCH_NOTIFY_BUFFER_SIZE", "must be at least 1"));
    }
    let notify_flush_interval_secs = parse_u64("PRICEWATCH_NOTIFY_FLUSH_INTERVAL_SECS", "60")?;
    let notify_send_delay_ms = parse_u64("PRICEWATCH_NOTIFY_SEND_DELAY_MS", "2000")?;
    let notify_max_attempts = positive_u32("PRICEWATCH_NOTIFY_MAX_ATTEMPTS", "3")?;
    let notify_retry_delay_ms = parse_u64("PRICEWATCH_NOTIFY_RETRY_DELAY_MS", "1000")?;
    let dead_letter_path = PathBuf::from(or_default(
        "PRICEWATCH_DEAD_LETTER_PATH",
        "./data/failed-notifications.json",
    ));
    let dead_letter_max_retries = positive_u32("PRICEWATCH_DEAD_LETTER_MAX_RETRIES", "3")?;
    let change_log_path = optional("PRICEWATCH_CHANGE_LOG_PATH").map(PathBuf::from);
    let telegram_api_base = or_default("PRICEWATCH_TELEGRAM_API_BASE", "https://api.telegram.org")
        .trim_end_matches('/')
        .to_string();
    let telegram_bot_token = optional("TELEGRAM_BOT_TOKEN");
    let telegram_chat_id = optional("TELEGRAM_CHAT_ID");

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        categories_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        crawl_interval_secs,
        global_timeout_secs,
        page_timeout_secs,
        pre_request_delay_min_ms,
        pre_request_delay_max_ms,
        inter_page_delay_ms,
        inter_category_delay_ms,
        fetch_max_attempts,
        fetch_retry_delay_ms,
        category_max_attempts,
        category_retry_delay_ms,
        max_concurrent_categories,
        user_agent,
        accept_language,
        snapshot_dir,
        price_min,
        price_max,
        default_discount_threshold,
        notify_mode,
        notify_buffer_size,
        notify_flush_interval_secs,
        notify_send_delay_ms,
        notify_max_attempts,
        notify_retry_delay_ms,
        dead_letter_path,
        dead_letter_max_retries,
        change_log_path,
        telegram_api_base,
        telegram_bot_token,
        telegram_chat_id,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "PRICEWATCH_ENV",
            format!("unrecognized environment '{other}'; expected development, test, or production"),
        )),
    }
}

fn parse_notify_mode(s: &str) -> Result<NotifyMode, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "instant" => Ok(NotifyMode::Instant),
        "batched" | "batch" => Ok(NotifyMode::Batched),
        other => Err(invalid(
            "PRICEWATCH_NOTIFY_MODE",
            format!("unrecognized notify mode '{other}'; expected instant or batched"),
        )),
    }
}

fn parse_threshold(s: &str) -> Result<Decimal, ConfigError> {
    const VAR: &str = "PRICEWATCH_DEFAULT_DISCOUNT_THRESHOLD";
    let value = Decimal::from_str(s.trim()).map_err(|e| invalid(VAR, e))?;
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(invalid(VAR, "must be between 0 and 100"));
    }
    Ok(value)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
