//! Test helper utilities
//!
//! Stub upstream sources with call counters, an in-memory database and a
//! service wired with millisecond cooldowns.

#![allow(dead_code)]

use async_trait::async_trait;
use brickvault_common::events::EventBus;
use brickvault_meta::models::{ColorEntry, NewRecord, PriceData, RecordKind, UserOwnedRecord};
use brickvault_meta::services::{
    BatchConfig, EnrichmentService, EnrichmentTuning, InventoryRow, Marketplace, MetadataCache, MinifigDetails,
    PartColors, PartsCatalog, PriceLookup, SetSummary, SourceError, SourceResult,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Single-connection in-memory database with every table created
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    brickvault_common::db::create_all_tables(&pool).await.unwrap();
    pool
}

pub const STANDARD_COOLDOWN: Duration = Duration::from_millis(2);
pub const RATE_LIMITED_COOLDOWN: Duration = Duration::from_millis(7);

/// Default tuning with cooldowns short enough for tests
pub fn fast_tuning() -> EnrichmentTuning {
    EnrichmentTuning {
        batch: BatchConfig {
            batch_size: 5,
            standard_cooldown: STANDARD_COOLDOWN,
            rate_limited_cooldown: RATE_LIMITED_COOLDOWN,
        },
        price_cooldown: Duration::from_millis(1),
        ..EnrichmentTuning::default()
    }
}

pub fn build_service(
    pool: SqlitePool,
    catalog: Arc<StubCatalog>,
    marketplace: Arc<StubMarketplace>,
) -> Arc<EnrichmentService> {
    Arc::new(EnrichmentService::new(
        Arc::new(MetadataCache::new(pool)),
        catalog,
        marketplace,
        EventBus::new(100),
        fast_tuning(),
    ))
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn new_record(kind: RecordKind, item_id: &str, color_id: Option<&str>) -> UserOwnedRecord {
    UserOwnedRecord::from_new(NewRecord {
        kind,
        item_id: item_id.to_string(),
        color_id: color_id.map(str::to_string),
        quantity_have: 1,
        quantity_want: 0,
        table_id: "table-1".to_string(),
        owner_id: "owner-1".to_string(),
    })
}

pub fn usd(new_min: f64, new_max: f64, used_min: f64, used_max: f64) -> PriceData {
    PriceData::from_ranges(Some(new_min), Some(new_max), Some(used_min), Some(used_max), "USD", "$")
}

/// Parts catalog stub
///
/// Unknown part and minifig ids answer 404. The first
/// `rate_limited_calls` part lookups answer 429.
#[derive(Default)]
pub struct StubCatalog {
    parts: Mutex<HashMap<String, PartColors>>,
    minifigs: Mutex<HashMap<String, MinifigDetails>>,
    sets: Mutex<HashMap<String, Vec<SetSummary>>>,
    rate_limited_calls: AtomicUsize,
    delay: Option<Duration>,
    pub part_calls: AtomicUsize,
    pub minifig_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
}

impl StubCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part(self, element_id: &str, name: &str, colors: &[(&str, &str)]) -> Self {
        let colors = colors
            .iter()
            .map(|(id, color)| ColorEntry::new(*id, *color, Some(format!("https://img.test/{}/{}.png", element_id, id))))
            .collect();
        self.parts.lock().unwrap().insert(
            element_id.to_string(),
            PartColors {
                element_name: name.to_string(),
                colors,
            },
        );
        self
    }

    pub fn with_minifig(self, minifig_id: &str, name: &str) -> Self {
        self.minifigs.lock().unwrap().insert(
            minifig_id.to_string(),
            MinifigDetails {
                minifig_id: minifig_id.to_string(),
                name: name.to_string(),
                image_url: Some(format!("https://img.test/{}.png", minifig_id)),
            },
        );
        self
    }

    pub fn with_sets(self, minifig_id: &str, set_nums: &[&str]) -> Self {
        let sets = set_nums
            .iter()
            .map(|s| SetSummary {
                set_num: s.to_string(),
                name: format!("Set {}", s),
            })
            .collect();
        self.sets.lock().unwrap().insert(minifig_id.to_string(), sets);
        self
    }

    pub fn with_rate_limited_calls(self, count: usize) -> Self {
        self.rate_limited_calls.store(count, Ordering::SeqCst);
        self
    }

    /// Hold every part lookup open for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn part_calls(&self) -> usize {
        self.part_calls.load(Ordering::SeqCst)
    }

    pub fn minifig_calls(&self) -> usize {
        self.minifig_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PartsCatalog for StubCatalog {
    async fn part_colors(&self, element_id: &str) -> SourceResult<PartColors> {
        self.part_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let limited = self
            .rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(SourceError::RateLimited { retry_after: None });
        }

        self.parts
            .lock()
            .unwrap()
            .get(element_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(element_id.to_string()))
    }

    async fn minifig(&self, minifig_id: &str) -> SourceResult<MinifigDetails> {
        self.minifig_calls.fetch_add(1, Ordering::SeqCst);
        self.minifigs
            .lock()
            .unwrap()
            .get(minifig_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(minifig_id.to_string()))
    }

    async fn minifig_sets(&self, minifig_id: &str) -> SourceResult<Vec<SetSummary>> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sets.lock().unwrap().get(minifig_id).cloned().unwrap_or_default())
    }
}

/// Marketplace stub keyed by marketplace id and set number
#[derive(Default)]
pub struct StubMarketplace {
    prices: Mutex<HashMap<String, PriceData>>,
    inventories: Mutex<HashMap<String, Vec<InventoryRow>>>,
    rate_limited: Mutex<bool>,
    pub price_calls: AtomicUsize,
    pub inventory_calls: AtomicUsize,
}

impl StubMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(self, set_num: &str, rows: &[(&str, &str)]) -> Self {
        let rows = rows
            .iter()
            .map(|(id, name)| InventoryRow {
                item_id: id.to_string(),
                name: name.to_string(),
            })
            .collect();
        self.inventories.lock().unwrap().insert(set_num.to_string(), rows);
        self
    }

    pub fn set_price(&self, marketplace_id: &str, data: PriceData) {
        self.prices.lock().unwrap().insert(marketplace_id.to_string(), data);
    }

    pub fn set_rate_limited(&self, limited: bool) {
        *self.rate_limited.lock().unwrap() = limited;
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Marketplace for StubMarketplace {
    async fn price_by_id(&self, marketplace_id: &str) -> SourceResult<PriceLookup> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if *self.rate_limited.lock().unwrap() {
            return Ok(PriceLookup::RateLimited);
        }
        self.prices
            .lock()
            .unwrap()
            .get(marketplace_id)
            .cloned()
            .map(PriceLookup::Found)
            .ok_or_else(|| SourceError::NotFound(marketplace_id.to_string()))
    }

    async fn set_inventory(&self, set_num: &str) -> SourceResult<Vec<InventoryRow>> {
        self.inventory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inventories.lock().unwrap().get(set_num).cloned().unwrap_or_default())
    }
}
