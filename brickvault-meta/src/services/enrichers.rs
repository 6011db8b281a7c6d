//! [`BatchEnricher`] implementations for parts, minifigs and prices

use async_trait::async_trait;
use brickvault_common::events::EnrichmentKind;
use brickvault_common::Result;
use chrono::Utc;
use std::sync::Arc;

use super::batch_orchestrator::BatchEnricher;
use super::minifig_fetcher::{is_minifig_hit, MinifigFetcher};
use super::part_fetcher::{is_part_hit, PartFetcher};
use super::price_service::{PriceRefresh, PriceService};
use crate::db::{prices, records};
use crate::models::{FetchOutcome, MinifigRef, RecordKind};

pub struct PartEnricher {
    fetcher: Arc<PartFetcher>,
}

impl PartEnricher {
    pub fn new(fetcher: Arc<PartFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl BatchEnricher for PartEnricher {
    fn kind(&self) -> EnrichmentKind {
        EnrichmentKind::Parts
    }

    async fn partition_cached(&self, ids: &[String]) -> Result<(Vec<String>, Vec<String>)> {
        let cached = self.fetcher.cache().get_parts(ids).await?;
        let now = Utc::now();
        Ok(ids
            .iter()
            .cloned()
            .partition(|id| cached.get(id).is_some_and(|p| is_part_hit(p, now))))
    }

    /// Invalid hits flag the records that reference them
    async fn apply_hits(&self, hits: &[String]) -> Result<()> {
        let cached = self.fetcher.cache().get_parts(hits).await?;
        let invalid: Vec<String> = cached.into_values().filter(|p| p.invalid).map(|p| p.element_id).collect();
        if !invalid.is_empty() {
            records::set_invalid_for_items(self.fetcher.cache().pool(), RecordKind::Brick, &invalid).await?;
        }
        Ok(())
    }

    async fn fetch_miss(&self, id: &str) -> FetchOutcome {
        self.fetcher.fetch(id).await
    }
}

pub struct MinifigEnricher {
    fetcher: Arc<MinifigFetcher>,
}

impl MinifigEnricher {
    pub fn new(fetcher: Arc<MinifigFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl BatchEnricher for MinifigEnricher {
    fn kind(&self) -> EnrichmentKind {
        EnrichmentKind::Minifigs
    }

    async fn partition_cached(&self, ids: &[String]) -> Result<(Vec<String>, Vec<String>)> {
        let cached = self.fetcher.cache().get_minifigs(ids).await?;
        let now = Utc::now();
        Ok(ids
            .iter()
            .cloned()
            .partition(|id| cached.get(id).is_some_and(|m| is_minifig_hit(m, now))))
    }

    /// Invalid hits flag the records that reference them
    async fn apply_hits(&self, hits: &[String]) -> Result<()> {
        let cached = self.fetcher.cache().get_minifigs(hits).await?;
        let invalid: Vec<String> = cached
            .into_values()
            .filter(|m| m.invalid)
            .map(|m| m.minifig_id_rebrickable)
            .collect();
        if !invalid.is_empty() {
            records::set_invalid_for_items(self.fetcher.cache().pool(), RecordKind::Minifig, &invalid).await?;
        }
        Ok(())
    }

    async fn fetch_miss(&self, id: &str) -> FetchOutcome {
        self.fetcher.fetch(id).await
    }
}

/// Price-only refresh of live snapshots
pub struct PriceEnricher {
    service: Arc<PriceService>,
}

impl PriceEnricher {
    pub fn new(service: Arc<PriceService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl BatchEnricher for PriceEnricher {
    fn kind(&self) -> EnrichmentKind {
        EnrichmentKind::Prices
    }

    async fn partition_cached(&self, ids: &[String]) -> Result<(Vec<String>, Vec<String>)> {
        let snapshots = prices::get_snapshots(self.service.pool(), ids).await?;
        let now = Utc::now();
        Ok(ids
            .iter()
            .cloned()
            .partition(|id| snapshots.get(id).is_some_and(|s| s.is_fresh_at(now))))
    }

    async fn apply_hits(&self, _hits: &[String]) -> Result<()> {
        Ok(())
    }

    async fn fetch_miss(&self, id: &str) -> FetchOutcome {
        match self.service.refresh_at(&MinifigRef::new(id), Utc::now()).await {
            PriceRefresh::Refreshed(_) => FetchOutcome::Stored,
            PriceRefresh::RateLimited => FetchOutcome::RateLimited,
            PriceRefresh::Failed(reason) => FetchOutcome::Failed(reason),
        }
    }
}
