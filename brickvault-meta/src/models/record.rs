//! User-owned brick and minifig records
//!
//! Records hold a non-owning reference to shared metadata by id. Deleting a
//! record never touches the metadata tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::part::ColorEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Brick,
    Minifig,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Brick => "brick",
            RecordKind::Minifig => "minifig",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "brick" => Some(RecordKind::Brick),
            "minifig" => Some(RecordKind::Minifig),
            _ => None,
        }
    }
}

/// A brick or minifig row in one owner's table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOwnedRecord {
    pub uuid: Uuid,
    pub kind: RecordKind,
    /// Element id for bricks, catalog minifig id for minifigs
    pub item_id: String,
    pub color_id: Option<String>,
    pub quantity_have: i64,
    pub quantity_want: i64,
    pub highlighted: bool,
    /// Mirrors the upstream not-found state of `item_id`
    pub invalid: bool,
    pub table_id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the CRUD layer on add-to-table
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub kind: RecordKind,
    pub item_id: String,
    #[serde(default)]
    pub color_id: Option<String>,
    #[serde(default)]
    pub quantity_have: i64,
    #[serde(default)]
    pub quantity_want: i64,
    pub table_id: String,
    pub owner_id: String,
}

impl UserOwnedRecord {
    pub fn from_new(new: NewRecord) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            kind: new.kind,
            item_id: new.item_id.trim().to_string(),
            color_id: new.color_id,
            quantity_have: new.quantity_have,
            quantity_want: new.quantity_want,
            highlighted: false,
            invalid: false,
            table_id: new.table_id,
            owner_id: new.owner_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Record joined with its metadata for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: UserOwnedRecord,
    pub display_name: String,
    pub image_url: Option<String>,
    pub available_colors: Vec<ColorEntry>,
    /// UI may offer a manual refresh
    pub cache_incomplete: bool,
    /// Metadata has not been fetched yet
    pub metadata_missing: bool,
}
