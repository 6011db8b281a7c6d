//! Part metadata persistence
//!
//! One row per element id, shared by every owner and table. Rows are never
//! deleted by user actions.

use brickvault_common::{Error, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use super::{parse_db_timestamp, to_db_timestamp};
use crate::models::{ColorEntry, PartMetadata};
use crate::utils::{max_lock_wait_ms, retry_on_lock};

fn row_to_part(row: &SqliteRow) -> Result<PartMetadata> {
    let colors_json: String = row.get("available_colors");
    let available_colors: Vec<ColorEntry> = serde_json::from_str(&colors_json)?;
    let expires_at: String = row.get("expires_at");

    Ok(PartMetadata {
        element_id: row.get("element_id"),
        element_name: row.get("element_name"),
        invalid: row.get::<i64, _>("invalid") != 0,
        cache_incomplete: row.get::<i64, _>("cache_incomplete") != 0,
        available_colors,
        expires_at: parse_db_timestamp(&expires_at, "expires_at")?,
    })
}

/// Load one element id
pub async fn get_part(pool: &SqlitePool, element_id: &str) -> Result<Option<PartMetadata>> {
    let row = sqlx::query(
        r#"
        SELECT element_id, element_name, invalid, cache_incomplete, available_colors, expires_at
        FROM part_metadata
        WHERE element_id = ?
        "#,
    )
    .bind(element_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_part).transpose()
}

/// Load many element ids in one query
///
/// Ids with no row are simply absent from the map.
pub async fn get_parts(pool: &SqlitePool, element_ids: &[String]) -> Result<HashMap<String, PartMetadata>> {
    if element_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT element_id, element_name, invalid, cache_incomplete, available_colors, expires_at \
         FROM part_metadata WHERE element_id IN (",
    );
    let mut separated = builder.separated(", ");
    for id in element_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = builder.build().fetch_all(pool).await?;

    rows.iter()
        .map(|row| row_to_part(row).map(|part| (part.element_id.clone(), part)))
        .collect()
}

/// Insert or replace the metadata for an element id (last writer wins)
pub async fn upsert_part(pool: &SqlitePool, part: &PartMetadata) -> Result<()> {
    if part.invalid && part.cache_incomplete {
        return Err(Error::InvalidInput(format!(
            "Part {} cannot be both invalid and incomplete",
            part.element_id
        )));
    }

    let colors_json = serde_json::to_string(&part.available_colors)?;
    let expires_at = to_db_timestamp(part.expires_at);
    let updated_at = to_db_timestamp(Utc::now());
    let max_wait_ms = max_lock_wait_ms(pool).await;

    retry_on_lock("upsert_part", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO part_metadata (
                element_id, element_name, invalid, cache_incomplete,
                available_colors, expires_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(element_id) DO UPDATE SET
                element_name = excluded.element_name,
                invalid = excluded.invalid,
                cache_incomplete = excluded.cache_incomplete,
                available_colors = excluded.available_colors,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&part.element_id)
        .bind(&part.element_name)
        .bind(part.invalid as i64)
        .bind(part.cache_incomplete as i64)
        .bind(&colors_json)
        .bind(&expires_at)
        .bind(&updated_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Count rows (diagnostics and tests)
pub async fn count_parts(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM part_metadata")
        .fetch_one(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_upsert_and_load_part() {
        let pool = memory_pool().await;

        let part = PartMetadata::with_colors(
            "3001",
            "Brick 2 x 4",
            vec![ColorEntry::new("4", "Red", Some("https://img/3001-4.png".to_string()))],
            Duration::days(30),
        );
        upsert_part(&pool, &part).await.unwrap();

        let loaded = get_part(&pool, "3001").await.unwrap().expect("part stored");
        assert_eq!(loaded.element_name, "Brick 2 x 4");
        assert!(!loaded.invalid);
        assert!(!loaded.cache_incomplete);
        assert_eq!(loaded.available_colors, part.available_colors);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_existing_row() {
        let pool = memory_pool().await;

        upsert_part(&pool, &PartMetadata::incomplete("3001", "Brick", Duration::days(1)))
            .await
            .unwrap();
        upsert_part(
            &pool,
            &PartMetadata::with_colors("3001", "Brick", vec![ColorEntry::new("1", "Blue", None)], Duration::days(1)),
        )
        .await
        .unwrap();

        let loaded = get_part(&pool, "3001").await.unwrap().unwrap();
        assert!(!loaded.cache_incomplete);
        assert_eq!(loaded.available_colors.len(), 1);
        assert_eq!(count_parts(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_parts_returns_only_known_ids() {
        let pool = memory_pool().await;
        upsert_part(&pool, &PartMetadata::invalid("99999999", Duration::days(1)))
            .await
            .unwrap();
        upsert_part(&pool, &PartMetadata::incomplete("3001", "Brick", Duration::days(1)))
            .await
            .unwrap();

        let found = get_parts(
            &pool,
            &["3001".to_string(), "99999999".to_string(), "3002".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(found.len(), 2);
        assert!(found["99999999"].invalid);
        assert!(found["3001"].cache_incomplete);
        assert!(get_parts(&pool, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_and_incomplete_together() {
        let pool = memory_pool().await;
        let mut part = PartMetadata::invalid("1", Duration::days(1));
        part.cache_incomplete = true;

        assert!(matches!(upsert_part(&pool, &part).await, Err(Error::InvalidInput(_))));
    }
}
