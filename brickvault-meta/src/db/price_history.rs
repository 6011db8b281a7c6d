//! Append-only price history
//!
//! Rows carry a hard expiry; [`purge_expired`] deletes the ones past it.

use brickvault_common::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use super::{parse_db_timestamp, to_db_timestamp};
use crate::models::PriceHistoryEntry;

fn row_to_entry(row: &SqliteRow) -> Result<PriceHistoryEntry> {
    let price_json: String = row.get("price_data");
    let created_at: String = row.get("created_at");
    let expires_at: String = row.get("expires_at");

    Ok(PriceHistoryEntry {
        id: row.get("id"),
        minifig_id_rebrickable: row.get("minifig_id_rebrickable"),
        price_data: serde_json::from_str(&price_json)?,
        created_at: parse_db_timestamp(&created_at, "created_at")?,
        expires_at: parse_db_timestamp(&expires_at, "expires_at")?,
    })
}

/// Most recent history row for a minifig
pub async fn latest_entry(pool: &SqlitePool, minifig_id: &str) -> Result<Option<PriceHistoryEntry>> {
    let row = sqlx::query(
        r#"
        SELECT id, minifig_id_rebrickable, price_data, created_at, expires_at
        FROM minifig_price_history
        WHERE minifig_id_rebrickable = ?
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(minifig_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_entry).transpose()
}

/// All history rows, newest first
pub async fn list_entries(pool: &SqlitePool, minifig_id: &str) -> Result<Vec<PriceHistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, minifig_id_rebrickable, price_data, created_at, expires_at
        FROM minifig_price_history
        WHERE minifig_id_rebrickable = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(minifig_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_entry).collect()
}

pub async fn count_entries(pool: &SqlitePool, minifig_id: &str) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM minifig_price_history WHERE minifig_id_rebrickable = ?")
            .bind(minifig_id)
            .fetch_one(pool)
            .await?,
    )
}

/// Delete rows whose hard expiry has passed; returns the number removed
pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM minifig_price_history WHERE expires_at <= ?")
        .bind(to_db_timestamp(now))
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::prices::{archive_and_replace, ArchiveRow};
    use crate::db::test_support::memory_pool;
    use crate::models::{PriceData, PriceSnapshot};
    use chrono::Duration;

    async fn archive(pool: &SqlitePool, id: &str, price: f64, created_at: DateTime<Utc>, ttl: Duration) {
        let data = PriceData::from_ranges(Some(price), Some(price), None, None, "USD", "$");
        let snapshot = PriceSnapshot {
            minifig_id_rebrickable: id.to_string(),
            price_data: data.clone(),
            is_expired: false,
            fetched_at: created_at,
            expires_at: created_at + Duration::days(1),
        };
        archive_and_replace(
            pool,
            &snapshot,
            Some(ArchiveRow {
                price_data: data,
                created_at,
                expires_at: created_at + ttl,
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_latest_entry_is_newest() {
        let pool = memory_pool().await;
        let base = Utc::now();
        archive(&pool, "fig-1", 1.0, base - Duration::days(3), Duration::days(10)).await;
        archive(&pool, "fig-1", 2.0, base - Duration::days(1), Duration::days(10)).await;

        let latest = latest_entry(&pool, "fig-1").await.unwrap().unwrap();
        assert_eq!(latest.price_data.new_min, Some(2.0));
        assert_eq!(list_entries(&pool, "fig-1").await.unwrap().len(), 2);
        assert!(latest_entry(&pool, "fig-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_rows() {
        let pool = memory_pool().await;
        let now = Utc::now();
        archive(&pool, "fig-1", 1.0, now - Duration::days(10), Duration::days(5)).await;
        archive(&pool, "fig-1", 2.0, now - Duration::days(1), Duration::days(5)).await;

        assert_eq!(purge_expired(&pool, now).await.unwrap(), 1);
        assert_eq!(count_entries(&pool, "fig-1").await.unwrap(), 1);
    }
}
