//! User-owned record persistence
//!
//! The CRUD layer owns these rows; the cache layer only reads them for the
//! enrichment join and flips `invalid` when an id is confirmed missing.

use brickvault_common::{Error, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{parse_db_timestamp, to_db_timestamp};
use crate::models::{RecordKind, UserOwnedRecord};
use crate::utils::{max_lock_wait_ms, retry_on_lock};

const SELECT_COLUMNS: &str = "uuid, kind, item_id, color_id, quantity_have, quantity_want, \
     highlighted, invalid, table_id, owner_id, created_at, updated_at";

fn row_to_record(row: &SqliteRow) -> Result<UserOwnedRecord> {
    let uuid_str: String = row.get("uuid");
    let kind_str: String = row.get("kind");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(UserOwnedRecord {
        uuid: Uuid::parse_str(&uuid_str)
            .map_err(|e| Error::Internal(format!("Invalid record uuid {}: {}", uuid_str, e)))?,
        kind: RecordKind::parse(&kind_str)
            .ok_or_else(|| Error::Internal(format!("Unknown record kind: {}", kind_str)))?,
        item_id: row.get("item_id"),
        color_id: row.get("color_id"),
        quantity_have: row.get("quantity_have"),
        quantity_want: row.get("quantity_want"),
        highlighted: row.get::<i64, _>("highlighted") != 0,
        invalid: row.get::<i64, _>("invalid") != 0,
        table_id: row.get("table_id"),
        owner_id: row.get("owner_id"),
        created_at: parse_db_timestamp(&created_at, "created_at")?,
        updated_at: parse_db_timestamp(&updated_at, "updated_at")?,
    })
}

pub async fn insert_record(pool: &SqlitePool, record: &UserOwnedRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_records (
            uuid, kind, item_id, color_id, quantity_have, quantity_want,
            highlighted, invalid, table_id, owner_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.uuid.to_string())
    .bind(record.kind.as_str())
    .bind(&record.item_id)
    .bind(&record.color_id)
    .bind(record.quantity_have)
    .bind(record.quantity_want)
    .bind(record.highlighted as i64)
    .bind(record.invalid as i64)
    .bind(&record.table_id)
    .bind(&record.owner_id)
    .bind(to_db_timestamp(record.created_at))
    .bind(to_db_timestamp(record.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_record(pool: &SqlitePool, uuid: Uuid) -> Result<Option<UserOwnedRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM user_records WHERE uuid = ?", SELECT_COLUMNS))
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// Records of one owner's table, oldest first
pub async fn list_records(pool: &SqlitePool, table_id: &str, owner_id: &str) -> Result<Vec<UserOwnedRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM user_records WHERE table_id = ? AND owner_id = ? ORDER BY created_at, uuid",
        SELECT_COLUMNS
    ))
    .bind(table_id)
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Every record, across owners, referencing `item_id`
pub async fn list_records_by_item(pool: &SqlitePool, kind: RecordKind, item_id: &str) -> Result<Vec<UserOwnedRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM user_records WHERE kind = ? AND item_id = ? ORDER BY created_at, uuid",
        SELECT_COLUMNS
    ))
    .bind(kind.as_str())
    .bind(item_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Point a record at a different item id
///
/// The new id has not been checked upstream yet, so `invalid` is cleared.
/// Returns the updated record.
pub async fn update_item_id(pool: &SqlitePool, uuid: Uuid, item_id: &str) -> Result<UserOwnedRecord> {
    let updated_at = to_db_timestamp(Utc::now());

    let result = sqlx::query("UPDATE user_records SET item_id = ?, invalid = 0, updated_at = ? WHERE uuid = ?")
        .bind(item_id)
        .bind(&updated_at)
        .bind(uuid.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Record {} not found", uuid)));
    }

    get_record(pool, uuid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Record {} not found", uuid)))
}

/// Delete a record; shared metadata is left alone
pub async fn delete_record(pool: &SqlitePool, uuid: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM user_records WHERE uuid = ?")
        .bind(uuid.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Flag every record referencing one of `item_ids` as invalid
///
/// Returns the number of rows touched.
pub async fn set_invalid_for_items(pool: &SqlitePool, kind: RecordKind, item_ids: &[String]) -> Result<u64> {
    if item_ids.is_empty() {
        return Ok(0);
    }

    let updated_at = to_db_timestamp(Utc::now());
    let max_wait_ms = max_lock_wait_ms(pool).await;

    retry_on_lock("set_invalid_for_items", max_wait_ms, || async {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE user_records SET invalid = 1, updated_at = ");
        builder.push_bind(&updated_at);
        builder.push(" WHERE kind = ");
        builder.push_bind(kind.as_str());
        builder.push(" AND item_id IN (");
        let mut separated = builder.separated(", ");
        for id in item_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(pool).await.map_err(Error::Database)?;
        Ok(result.rows_affected())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use crate::models::NewRecord;

    fn brick(item_id: &str, table: &str, owner: &str) -> UserOwnedRecord {
        UserOwnedRecord::from_new(NewRecord {
            kind: RecordKind::Brick,
            item_id: item_id.to_string(),
            color_id: Some("4".to_string()),
            quantity_have: 2,
            quantity_want: 4,
            table_id: table.to_string(),
            owner_id: owner.to_string(),
        })
    }

    #[tokio::test]
    async fn test_list_records_scoped_to_owner_table() {
        let pool = memory_pool().await;
        insert_record(&pool, &brick("3001", "t1", "alice")).await.unwrap();
        insert_record(&pool, &brick("3002", "t1", "alice")).await.unwrap();
        insert_record(&pool, &brick("3001", "t1", "bob")).await.unwrap();

        let records = list_records(&pool, "t1", "alice").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.owner_id == "alice"));
    }

    #[tokio::test]
    async fn test_set_invalid_touches_every_owner() {
        let pool = memory_pool().await;
        insert_record(&pool, &brick("99999999", "t1", "alice")).await.unwrap();
        insert_record(&pool, &brick("99999999", "t2", "bob")).await.unwrap();
        insert_record(&pool, &brick("3001", "t1", "alice")).await.unwrap();

        let touched = set_invalid_for_items(&pool, RecordKind::Brick, &["99999999".to_string()])
            .await
            .unwrap();
        assert_eq!(touched, 2);

        let bad = list_records_by_item(&pool, RecordKind::Brick, "99999999").await.unwrap();
        assert!(bad.iter().all(|r| r.invalid));
        let good = list_records_by_item(&pool, RecordKind::Brick, "3001").await.unwrap();
        assert!(!good[0].invalid);
    }

    #[tokio::test]
    async fn test_update_item_id_clears_invalid() {
        let pool = memory_pool().await;
        let record = brick("99999999", "t1", "alice");
        insert_record(&pool, &record).await.unwrap();
        set_invalid_for_items(&pool, RecordKind::Brick, &["99999999".to_string()])
            .await
            .unwrap();

        let updated = update_item_id(&pool, record.uuid, "3001").await.unwrap();
        assert_eq!(updated.item_id, "3001");
        assert!(!updated.invalid);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let pool = memory_pool().await;
        let result = update_item_id(&pool, Uuid::new_v4(), "3001").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_record_leaves_metadata() {
        use crate::db::parts;
        use crate::models::PartMetadata;

        let pool = memory_pool().await;
        let record = brick("3001", "t1", "alice");
        insert_record(&pool, &record).await.unwrap();
        parts::upsert_part(&pool, &PartMetadata::incomplete("3001", "Brick", chrono::Duration::days(1)))
            .await
            .unwrap();

        assert!(delete_record(&pool, record.uuid).await.unwrap());
        assert!(!delete_record(&pool, record.uuid).await.unwrap());
        assert!(parts::get_part(&pool, "3001").await.unwrap().is_some());
    }
}
