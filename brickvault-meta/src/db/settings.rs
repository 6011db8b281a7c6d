//! Settings database operations
//!
//! Key-value accessors over the `settings` table.

use brickvault_common::{Error, Result};
use sqlx::{Pool, Sqlite};

const REBRICKABLE_API_KEY: &str = "rebrickable_api_key";

/// Get the catalog API key from the database
pub async fn get_rebrickable_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, REBRICKABLE_API_KEY).await
}

/// Store the catalog API key
pub async fn set_rebrickable_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, REBRICKABLE_API_KEY, key).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;

    #[tokio::test]
    async fn test_api_key_round_trip() {
        let pool = memory_pool().await;

        assert_eq!(get_rebrickable_api_key(&pool).await.unwrap(), None);

        set_rebrickable_api_key(&pool, "old-key".to_string()).await.unwrap();
        set_rebrickable_api_key(&pool, "new-key".to_string()).await.unwrap();

        assert_eq!(
            get_rebrickable_api_key(&pool).await.unwrap(),
            Some("new-key".to_string())
        );
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = memory_pool().await;
        set_setting(&pool, "batch_size", "five").await.unwrap();

        let result = get_setting::<usize>(&pool, "batch_size").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
