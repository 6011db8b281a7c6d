//! Enrichment read path
//!
//! Joins user records with cached metadata at read time: one batched lookup
//! per metadata kind, then an in-memory join. An invalid id (on the record or
//! in the metadata) forces the sentinel name and hides image and colors.

use brickvault_common::Result;
use std::collections::{BTreeSet, HashMap};

use super::cache_manager::MetadataCache;
use crate::models::{
    EnrichedRecord, MinifigMetadata, PartMetadata, RecordKind, UserOwnedRecord, INVALID_PART_NAME,
};

pub async fn join_user_records_with_metadata(
    cache: &MetadataCache,
    records: Vec<UserOwnedRecord>,
) -> Result<Vec<EnrichedRecord>> {
    let part_ids = distinct_ids(&records, RecordKind::Brick);
    let minifig_ids = distinct_ids(&records, RecordKind::Minifig);

    let parts = cache.get_parts(&part_ids).await?;
    let minifigs = cache.get_minifigs(&minifig_ids).await?;

    Ok(records
        .into_iter()
        .map(|record| match record.kind {
            RecordKind::Brick => join_part(record, &parts),
            RecordKind::Minifig => join_minifig(record, &minifigs),
        })
        .collect())
}

fn distinct_ids(records: &[UserOwnedRecord], kind: RecordKind) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.kind == kind)
        .map(|r| r.item_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn invalid_record(mut record: UserOwnedRecord, metadata_missing: bool) -> EnrichedRecord {
    record.invalid = true;
    EnrichedRecord {
        record,
        display_name: INVALID_PART_NAME.to_string(),
        image_url: None,
        available_colors: Vec::new(),
        cache_incomplete: false,
        metadata_missing,
    }
}

fn missing_metadata(record: UserOwnedRecord) -> EnrichedRecord {
    EnrichedRecord {
        display_name: record.item_id.clone(),
        record,
        image_url: None,
        available_colors: Vec::new(),
        cache_incomplete: false,
        metadata_missing: true,
    }
}

fn join_part(record: UserOwnedRecord, parts: &HashMap<String, PartMetadata>) -> EnrichedRecord {
    let meta = parts.get(&record.item_id);

    if record.invalid || meta.is_some_and(|m| m.invalid) {
        return invalid_record(record, meta.is_none());
    }

    let Some(meta) = meta else {
        return missing_metadata(record);
    };

    // Prefer the image for the record's own color
    let image_url = record
        .color_id
        .as_ref()
        .and_then(|color_id| meta.available_colors.iter().find(|c| &c.color_id == color_id))
        .or_else(|| meta.available_colors.first())
        .and_then(|c| c.image_url.clone());

    EnrichedRecord {
        record,
        display_name: meta.element_name.clone(),
        image_url,
        available_colors: meta.available_colors.clone(),
        cache_incomplete: meta.cache_incomplete,
        metadata_missing: false,
    }
}

fn join_minifig(record: UserOwnedRecord, minifigs: &HashMap<String, MinifigMetadata>) -> EnrichedRecord {
    let meta = minifigs.get(&record.item_id);

    if record.invalid || meta.is_some_and(|m| m.invalid) {
        return invalid_record(record, meta.is_none());
    }

    match meta {
        Some(meta) if !meta.minifig_name.is_empty() => EnrichedRecord {
            record,
            display_name: meta.minifig_name.clone(),
            image_url: Some(meta.minifig_image.clone()).filter(|url| !url.is_empty()),
            available_colors: Vec::new(),
            cache_incomplete: false,
            metadata_missing: false,
        },
        _ => missing_metadata(record),
    }
}
