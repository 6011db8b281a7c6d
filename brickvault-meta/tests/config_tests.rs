//! Catalog API key resolution order
//!
//! Touches the process environment, so every test runs serially.

mod helpers;

use brickvault_common::config::TomlConfig;
use brickvault_meta::config::{resolve_rebrickable_api_key, API_KEY_ENV_VAR};
use brickvault_meta::db::settings;
use helpers::memory_pool;
use serial_test::serial;

fn toml_with_key(key: Option<&str>) -> TomlConfig {
    TomlConfig {
        rebrickable_api_key: key.map(str::to_string),
        ..TomlConfig::default()
    }
}

#[tokio::test]
#[serial]
async fn test_database_key_wins() {
    let pool = memory_pool().await;
    settings::set_rebrickable_api_key(&pool, "db-key".to_string()).await.unwrap();
    std::env::set_var(API_KEY_ENV_VAR, "env-key");

    let key = resolve_rebrickable_api_key(&pool, &toml_with_key(Some("toml-key"))).await.unwrap();
    assert_eq!(key, "db-key");

    std::env::remove_var(API_KEY_ENV_VAR);
}

#[tokio::test]
#[serial]
async fn test_env_beats_toml() {
    let pool = memory_pool().await;
    std::env::set_var(API_KEY_ENV_VAR, "env-key");

    let key = resolve_rebrickable_api_key(&pool, &toml_with_key(Some("toml-key"))).await.unwrap();
    assert_eq!(key, "env-key");

    std::env::remove_var(API_KEY_ENV_VAR);
}

#[tokio::test]
#[serial]
async fn test_blank_sources_are_skipped() {
    let pool = memory_pool().await;
    settings::set_rebrickable_api_key(&pool, "   ".to_string()).await.unwrap();
    std::env::set_var(API_KEY_ENV_VAR, "");

    let key = resolve_rebrickable_api_key(&pool, &toml_with_key(Some("toml-key"))).await.unwrap();
    assert_eq!(key, "toml-key");

    std::env::remove_var(API_KEY_ENV_VAR);
}

#[tokio::test]
#[serial]
async fn test_missing_key_is_config_error() {
    let pool = memory_pool().await;
    std::env::remove_var(API_KEY_ENV_VAR);

    let err = resolve_rebrickable_api_key(&pool, &toml_with_key(None)).await.unwrap_err();
    assert!(matches!(err, brickvault_common::Error::Config(_)));
}
