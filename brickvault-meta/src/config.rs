//! Configuration resolution for brickvault-meta
//!
//! The catalog API key resolves Database → ENV → TOML. Client tunables come
//! from the `[enrichment]` TOML section.

use brickvault_common::config::{EnrichmentSettings, TomlConfig};
use brickvault_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tracing::{info, warn};

use crate::services::{RateLimitConfig, RetryOptions};

pub const API_KEY_ENV_VAR: &str = "BRICKVAULT_REBRICKABLE_API_KEY";

/// Resolve the parts catalog API key
///
/// **Priority:** Database → ENV → TOML. Warns when more than one source is
/// set.
pub async fn resolve_rebrickable_api_key(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> Result<String> {
    let db_key = crate::db::settings::get_rebrickable_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.rebrickable_api_key.clone().filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "Rebrickable API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Rebrickable API key loaded from database");
        return Ok(key);
    }
    if let Some(key) = env_key {
        info!("Rebrickable API key loaded from environment variable");
        return Ok(key);
    }
    if let Some(key) = toml_key {
        info!("Rebrickable API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "Rebrickable API key not configured. Set it in the settings table, \
         the {} environment variable, or rebrickable_api_key in the TOML config",
        API_KEY_ENV_VAR
    )))
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

pub fn retry_options(settings: &EnrichmentSettings) -> RetryOptions {
    RetryOptions {
        retries: settings.http_retries,
        retry_delay: Duration::from_millis(settings.http_retry_delay_ms),
        timeout: Duration::from_millis(settings.http_timeout_ms),
        rate_limited_retry: true,
    }
}

pub fn rate_limit_config(settings: &EnrichmentSettings) -> RateLimitConfig {
    RateLimitConfig {
        requests_per_second: settings.catalog_requests_per_second,
        burst: settings.catalog_burst,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_defaults_map_to_client_options() {
        let settings = EnrichmentSettings::default();
        let retry = retry_options(&settings);
        assert_eq!(retry.retries, 3);
        assert_eq!(retry.retry_delay, Duration::from_secs(1));
        assert_eq!(retry.timeout, Duration::from_secs(8));

        let limit = rate_limit_config(&settings);
        assert_eq!(limit, RateLimitConfig { requests_per_second: 1, burst: 5 });
    }
}
