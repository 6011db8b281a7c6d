//! Database initialization
//!
//! Creates the shared tables used by the metadata cache layer and the
//! user-owned record tables it enriches. Every statement is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the enrichment writers and the read path overlap
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 250").execute(&pool).await?;

    create_all_tables(&pool).await?;

    Ok(pool)
}

/// Create every table (used by startup and by tests on in-memory pools)
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_part_metadata_table(pool).await?;
    create_minifig_metadata_table(pool).await?;
    create_minifig_prices_table(pool).await?;
    create_minifig_price_history_table(pool).await?;
    create_user_records_table(pool).await?;

    ensure_setting(pool, "db_max_lock_wait_ms", "5000").await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Part metadata, shared across all owners and tables
pub async fn create_part_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS part_metadata (
            element_id TEXT PRIMARY KEY,
            element_name TEXT NOT NULL DEFAULT '',
            invalid INTEGER NOT NULL DEFAULT 0,
            cache_incomplete INTEGER NOT NULL DEFAULT 0,
            available_colors TEXT NOT NULL DEFAULT '[]',
            expires_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (NOT (invalid = 1 AND cache_incomplete = 1))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Minifig metadata keyed by catalog id
pub async fn create_minifig_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS minifig_metadata (
            minifig_id_rebrickable TEXT PRIMARY KEY,
            minifig_name TEXT NOT NULL DEFAULT '',
            minifig_image TEXT NOT NULL DEFAULT '',
            minifig_id_bricklink TEXT,
            invalid INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Live price snapshot, one row per minifig
pub async fn create_minifig_prices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS minifig_prices (
            minifig_id_rebrickable TEXT PRIMARY KEY,
            price_data TEXT NOT NULL,
            is_expired INTEGER NOT NULL DEFAULT 0,
            fetched_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only price history
pub async fn create_minifig_price_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS minifig_price_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            minifig_id_rebrickable TEXT NOT NULL,
            price_data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_price_history_minifig_created
        ON minifig_price_history (minifig_id_rebrickable, created_at)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// User-owned brick and minifig rows (per owner + table)
pub async fn create_user_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_records (
            uuid TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('brick', 'minifig')),
            item_id TEXT NOT NULL,
            color_id TEXT,
            quantity_have INTEGER NOT NULL DEFAULT 0,
            quantity_want INTEGER NOT NULL DEFAULT 0,
            highlighted INTEGER NOT NULL DEFAULT 0,
            invalid INTEGER NOT NULL DEFAULT 0,
            table_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_user_records_table_owner
        ON user_records (table_id, owner_id)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a default setting if it is missing or NULL
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match value {
        Some(Some(_)) => Ok(()),
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            info!("Reset NULL setting '{}' to default value: {}", key, default_value);
            Ok(())
        }
        None => {
            // INSERT OR IGNORE: concurrent initializers may race past the lookup
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
            Ok(())
        }
    }
}
