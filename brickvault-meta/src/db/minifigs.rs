//! Minifig metadata persistence

use brickvault_common::{Error, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use super::{parse_db_timestamp, to_db_timestamp};
use crate::models::MinifigMetadata;
use crate::utils::{max_lock_wait_ms, retry_on_lock};

const SELECT_COLUMNS: &str =
    "minifig_id_rebrickable, minifig_name, minifig_image, minifig_id_bricklink, invalid, expires_at";

fn row_to_minifig(row: &SqliteRow) -> Result<MinifigMetadata> {
    let expires_at: String = row.get("expires_at");

    Ok(MinifigMetadata {
        minifig_id_rebrickable: row.get("minifig_id_rebrickable"),
        minifig_name: row.get("minifig_name"),
        minifig_image: row.get("minifig_image"),
        minifig_id_bricklink: row.get("minifig_id_bricklink"),
        invalid: row.get::<i64, _>("invalid") != 0,
        expires_at: parse_db_timestamp(&expires_at, "expires_at")?,
    })
}

pub async fn get_minifig(pool: &SqlitePool, minifig_id: &str) -> Result<Option<MinifigMetadata>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM minifig_metadata WHERE minifig_id_rebrickable = ?",
        SELECT_COLUMNS
    ))
    .bind(minifig_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_minifig).transpose()
}

/// Load many minifig ids in one query
pub async fn get_minifigs(pool: &SqlitePool, minifig_ids: &[String]) -> Result<HashMap<String, MinifigMetadata>> {
    if minifig_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM minifig_metadata WHERE minifig_id_rebrickable IN (",
        SELECT_COLUMNS
    ));
    let mut separated = builder.separated(", ");
    for id in minifig_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = builder.build().fetch_all(pool).await?;

    rows.iter()
        .map(|row| row_to_minifig(row).map(|m| (m.minifig_id_rebrickable.clone(), m)))
        .collect()
}

/// Insert or update name/image and the invalid flag
///
/// A resolved marketplace id is never overwritten by `None`: resolution is
/// the most expensive lookup and is kept permanently.
pub async fn upsert_minifig(pool: &SqlitePool, minifig: &MinifigMetadata) -> Result<()> {
    let expires_at = to_db_timestamp(minifig.expires_at);
    let updated_at = to_db_timestamp(Utc::now());
    let max_wait_ms = max_lock_wait_ms(pool).await;

    retry_on_lock("upsert_minifig", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO minifig_metadata (
                minifig_id_rebrickable, minifig_name, minifig_image,
                minifig_id_bricklink, invalid, expires_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(minifig_id_rebrickable) DO UPDATE SET
                minifig_name = excluded.minifig_name,
                minifig_image = excluded.minifig_image,
                minifig_id_bricklink = COALESCE(excluded.minifig_id_bricklink, minifig_metadata.minifig_id_bricklink),
                invalid = excluded.invalid,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&minifig.minifig_id_rebrickable)
        .bind(&minifig.minifig_name)
        .bind(&minifig.minifig_image)
        .bind(&minifig.minifig_id_bricklink)
        .bind(minifig.invalid as i64)
        .bind(&expires_at)
        .bind(&updated_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Record a resolved marketplace id
///
/// Creates a stale placeholder row when the minifig has no metadata yet so
/// the id is kept even before name/image are fetched.
pub async fn set_bricklink_id(pool: &SqlitePool, minifig_id: &str, bricklink_id: &str) -> Result<()> {
    let now = to_db_timestamp(Utc::now());
    let max_wait_ms = max_lock_wait_ms(pool).await;

    retry_on_lock("set_bricklink_id", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO minifig_metadata (
                minifig_id_rebrickable, minifig_id_bricklink, expires_at, updated_at
            ) VALUES (?, ?, ?, ?)
            ON CONFLICT(minifig_id_rebrickable) DO UPDATE SET
                minifig_id_bricklink = excluded.minifig_id_bricklink,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(minifig_id)
        .bind(bricklink_id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}
