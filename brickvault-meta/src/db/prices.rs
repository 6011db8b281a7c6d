//! Live price snapshot persistence
//!
//! One live row per minifig. Replacing it goes through
//! [`archive_and_replace`] so the superseded value is copied to history and
//! flagged expired before the new value is written.

use brickvault_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use super::{parse_db_timestamp, to_db_timestamp};
use crate::models::{PriceData, PriceSnapshot};

fn row_to_snapshot(row: &SqliteRow) -> Result<PriceSnapshot> {
    let price_json: String = row.get("price_data");
    let fetched_at: String = row.get("fetched_at");
    let expires_at: String = row.get("expires_at");

    Ok(PriceSnapshot {
        minifig_id_rebrickable: row.get("minifig_id_rebrickable"),
        price_data: serde_json::from_str(&price_json)?,
        is_expired: row.get::<i64, _>("is_expired") != 0,
        fetched_at: parse_db_timestamp(&fetched_at, "fetched_at")?,
        expires_at: parse_db_timestamp(&expires_at, "expires_at")?,
    })
}

pub async fn get_snapshot(pool: &SqlitePool, minifig_id: &str) -> Result<Option<PriceSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT minifig_id_rebrickable, price_data, is_expired, fetched_at, expires_at
        FROM minifig_prices
        WHERE minifig_id_rebrickable = ?
        "#,
    )
    .bind(minifig_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_snapshot).transpose()
}

pub async fn get_snapshots(pool: &SqlitePool, minifig_ids: &[String]) -> Result<HashMap<String, PriceSnapshot>> {
    if minifig_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT minifig_id_rebrickable, price_data, is_expired, fetched_at, expires_at \
         FROM minifig_prices WHERE minifig_id_rebrickable IN (",
    );
    let mut separated = builder.separated(", ");
    for id in minifig_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = builder.build().fetch_all(pool).await?;

    rows.iter()
        .map(|row| row_to_snapshot(row).map(|s| (s.minifig_id_rebrickable.clone(), s)))
        .collect()
}

/// History row to append while replacing a snapshot
#[derive(Debug, Clone)]
pub struct ArchiveRow {
    pub price_data: PriceData,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Archive-then-overwrite in one transaction
///
/// 1. append `archive` to history (when given)
/// 2. flag the current live row expired
/// 3. write `snapshot` as the new live row
pub async fn archive_and_replace(
    pool: &SqlitePool,
    snapshot: &PriceSnapshot,
    archive: Option<ArchiveRow>,
) -> Result<()> {
    let price_json = serde_json::to_string(&snapshot.price_data)?;
    let archive_json = archive
        .as_ref()
        .map(|a| serde_json::to_string(&a.price_data))
        .transpose()?;

    let mut tx = pool.begin().await?;

    if let (Some(row), Some(json)) = (&archive, &archive_json) {
        sqlx::query(
            r#"
            INSERT INTO minifig_price_history (minifig_id_rebrickable, price_data, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.minifig_id_rebrickable)
        .bind(json)
        .bind(to_db_timestamp(row.created_at))
        .bind(to_db_timestamp(row.expires_at))
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE minifig_prices SET is_expired = 1 WHERE minifig_id_rebrickable = ?")
        .bind(&snapshot.minifig_id_rebrickable)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO minifig_prices (minifig_id_rebrickable, price_data, is_expired, fetched_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(minifig_id_rebrickable) DO UPDATE SET
            price_data = excluded.price_data,
            is_expired = excluded.is_expired,
            fetched_at = excluded.fetched_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(&snapshot.minifig_id_rebrickable)
    .bind(&price_json)
    .bind(snapshot.is_expired as i64)
    .bind(to_db_timestamp(snapshot.fetched_at))
    .bind(to_db_timestamp(snapshot.expires_at))
    .execute(&mut *tx)
    .await?;

    tx.commit().await.map_err(Error::Database)?;

    Ok(())
}
