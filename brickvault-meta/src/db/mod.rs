//! Database access for the metadata cache layer
//!
//! SQLite is the source of truth for metadata, prices and user records.
//! Timestamps are stored as fixed-width RFC 3339 text so that SQL string
//! comparison orders them correctly.

pub mod minifigs;
pub mod parts;
pub mod price_history;
pub mod prices;
pub mod records;
pub mod settings;

use brickvault_common::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the database and ensure all tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    brickvault_common::db::init_database(db_path).await
}

/// Canonical text form for timestamp columns
pub(crate) fn to_db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(to_db_timestamp(earlier) < to_db_timestamp(later));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let parsed = parse_db_timestamp(&to_db_timestamp(now), "created_at").unwrap();
        assert_eq!(parsed, now);
    }
}
