//! Table creation against real SQLite databases

use brickvault_common::db::{create_all_tables, init_database};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tempfile::TempDir;

async fn table_names(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_init_database_creates_file_and_tables() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("data").join("brickvault.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let tables = table_names(&pool).await;
    for expected in [
        "minifig_metadata",
        "minifig_price_history",
        "minifig_prices",
        "part_metadata",
        "settings",
        "user_records",
    ] {
        assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_create_all_tables_is_idempotent() {
    let pool = memory_pool().await;

    create_all_tables(&pool).await.unwrap();
    create_all_tables(&pool).await.unwrap();

    let lock_wait: String =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'db_max_lock_wait_ms'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(lock_wait, "5000");
}

#[tokio::test]
async fn test_invalid_and_incomplete_are_mutually_exclusive() {
    let pool = memory_pool().await;
    create_all_tables(&pool).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO part_metadata (element_id, invalid, cache_incomplete, expires_at, updated_at)
         VALUES ('3001', 1, 1, '2030-01-01T00:00:00Z', '2030-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}
