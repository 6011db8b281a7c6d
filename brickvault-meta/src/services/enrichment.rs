//! Enrichment service
//!
//! Entry point used by the CRUD layer and the HTTP handlers. Wires the
//! cache manager, fetchers, price service and batch orchestrator together
//! and exposes:
//!
//! - [`EnrichmentService::enrich_batch`]: background run, returns at once
//! - [`EnrichmentService::enrich_one_part`] / [`EnrichmentService::enrich_one_minifig`]:
//!   request-path lookups that report failures to the caller
//! - [`EnrichmentService::get_part_metadata`]
//! - [`EnrichmentService::get_minifig_price_with_trend`]
//! - [`EnrichmentService::join_user_records_with_metadata`]

use brickvault_common::events::{BrickEvent, EnrichmentKind, EventBus};
use chrono::{Duration as ChronoDuration, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use brickvault_common::config::EnrichmentSettings;

use super::batch_orchestrator::{BatchConfig, BatchEnricher, BatchOrchestrator};
use super::batch_registry::BatchRegistry;
use super::cache_manager::MetadataCache;
use super::enrichers::{MinifigEnricher, PartEnricher, PriceEnricher};
use super::marketplace_resolver::MarketplaceResolver;
use super::minifig_fetcher::MinifigFetcher;
use super::name_matcher::{JaroWinklerScorer, NameScorer};
use super::part_fetcher::PartFetcher;
use super::price_service::PriceService;
use super::read_path;
use super::sources::{Marketplace, PartsCatalog};
use crate::db::records;
use crate::models::{
    BatchRunStatus, EnrichAccepted, EnrichedRecord, FetchOutcome, MinifigMetadata, MinifigRef, NewRecord,
    PartMetadata, PriceWithTrend, RecordKind, RunState, UserOwnedRecord,
};

/// Failure of a request-path enrichment
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Upstream rate limited the lookup")]
    RateLimited,

    #[error("Upstream lookup failed: {0}")]
    Upstream(String),

    #[error("Id not found upstream: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] brickvault_common::Error),
}

/// Tunables resolved from [`EnrichmentSettings`]
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentTuning {
    pub batch: BatchConfig,
    pub price_cooldown: Duration,
    pub part_ttl: ChronoDuration,
    pub minifig_ttl: ChronoDuration,
    pub price_ttl: ChronoDuration,
    pub history_multiplier: i32,
}

impl From<&EnrichmentSettings> for EnrichmentTuning {
    fn from(settings: &EnrichmentSettings) -> Self {
        Self {
            batch: BatchConfig {
                batch_size: settings.batch_size,
                standard_cooldown: Duration::from_millis(settings.standard_cooldown_ms),
                rate_limited_cooldown: Duration::from_millis(settings.rate_limited_cooldown_ms),
            },
            price_cooldown: Duration::from_millis(settings.price_cooldown_ms),
            part_ttl: ChronoDuration::hours(settings.part_ttl_hours),
            minifig_ttl: ChronoDuration::hours(settings.minifig_ttl_hours),
            price_ttl: ChronoDuration::hours(settings.price_ttl_hours),
            history_multiplier: settings.history_ttl_multiplier.clamp(1, i32::MAX as i64) as i32,
        }
    }
}

impl Default for EnrichmentTuning {
    fn default() -> Self {
        Self::from(&EnrichmentSettings::default())
    }
}

pub struct EnrichmentService {
    cache: Arc<MetadataCache>,
    part_fetcher: Arc<PartFetcher>,
    minifig_fetcher: Arc<MinifigFetcher>,
    price_service: Arc<PriceService>,
    orchestrator: Arc<BatchOrchestrator>,
    events: EventBus,
    tuning: EnrichmentTuning,
}

impl EnrichmentService {
    /// Build with the default Jaro-Winkler name scorer
    pub fn new(
        cache: Arc<MetadataCache>,
        catalog: Arc<dyn PartsCatalog>,
        marketplace: Arc<dyn Marketplace>,
        events: EventBus,
        tuning: EnrichmentTuning,
    ) -> Self {
        Self::with_scorer(cache, catalog, marketplace, Arc::new(JaroWinklerScorer), events, tuning)
    }

    pub fn with_scorer(
        cache: Arc<MetadataCache>,
        catalog: Arc<dyn PartsCatalog>,
        marketplace: Arc<dyn Marketplace>,
        scorer: Arc<dyn NameScorer>,
        events: EventBus,
        tuning: EnrichmentTuning,
    ) -> Self {
        let part_fetcher = Arc::new(PartFetcher::new(
            cache.clone(),
            catalog.clone(),
            events.clone(),
            tuning.part_ttl,
        ));
        let minifig_fetcher = Arc::new(MinifigFetcher::new(cache.clone(), catalog.clone(), tuning.minifig_ttl));
        let resolver = Arc::new(MarketplaceResolver::new(cache.clone(), catalog, marketplace.clone(), scorer));
        let price_service = Arc::new(PriceService::new(
            cache.pool().clone(),
            resolver,
            marketplace,
            events.clone(),
            tuning.price_ttl,
            tuning.history_multiplier,
        ));
        let orchestrator = Arc::new(BatchOrchestrator::new(BatchRegistry::new(), events.clone()));

        Self {
            cache,
            part_fetcher,
            minifig_fetcher,
            price_service,
            orchestrator,
            events,
            tuning,
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn registry(&self) -> &BatchRegistry {
        self.orchestrator.registry()
    }

    pub fn price_service(&self) -> &Arc<PriceService> {
        &self.price_service
    }

    fn enricher_for(&self, kind: EnrichmentKind) -> (Arc<dyn BatchEnricher>, BatchConfig) {
        match kind {
            EnrichmentKind::Parts => (Arc::new(PartEnricher::new(self.part_fetcher.clone())), self.tuning.batch),
            EnrichmentKind::Minifigs => (
                Arc::new(MinifigEnricher::new(self.minifig_fetcher.clone())),
                self.tuning.batch,
            ),
            EnrichmentKind::Prices => (
                Arc::new(PriceEnricher::new(self.price_service.clone())),
                self.tuning.batch.for_prices(self.tuning.price_cooldown),
            ),
        }
    }

    /// Start a background run and return its id immediately
    pub async fn enrich_batch(
        &self,
        kind: EnrichmentKind,
        ids: Vec<String>,
        table_id: Option<String>,
        owner_id: Option<String>,
    ) -> EnrichAccepted {
        let batch_id = Uuid::new_v4();
        let registry = self.registry().clone();
        let status = BatchRunStatus::new(batch_id, kind, ids.len()).with_scope(table_id.clone(), owner_id.clone());
        registry.register(status).await;

        tracing::info!(
            batch_id = %batch_id,
            kind = kind.as_str(),
            ids = ids.len(),
            table_id = ?table_id,
            owner_id = ?owner_id,
            "Enrichment batch accepted"
        );

        self.events.emit_lossy(BrickEvent::EnrichmentStarted {
            batch_id,
            kind,
            total_ids: ids.len(),
            timestamp: Utc::now(),
        });

        let (enricher, config) = self.enricher_for(kind);
        let orchestrator = self.orchestrator.clone();
        let events = self.events.clone();
        let task_registry = registry.clone();

        let handle = tokio::spawn(async move {
            let run = orchestrator.run(batch_id, enricher.as_ref(), &ids, config);
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(report) => {
                    task_registry
                        .update(batch_id, |s| {
                            s.state = RunState::Completed;
                            s.finished_at = Some(Utc::now());
                        })
                        .await;
                    events.emit_lossy(BrickEvent::EnrichmentCompleted {
                        batch_id,
                        kind,
                        processed: report.processed(),
                        failed: report.failed(),
                        timestamp: Utc::now(),
                    });
                }
                Err(_) => {
                    tracing::error!(batch_id = %batch_id, "Enrichment task panicked");
                    task_registry
                        .update(batch_id, |s| {
                            s.state = RunState::Failed;
                            s.finished_at = Some(Utc::now());
                            s.error = Some("enrichment task panicked".to_string());
                        })
                        .await;
                }
            }
        });
        registry.attach_handle(batch_id, handle).await;

        EnrichAccepted {
            accepted: true,
            batch_id,
        }
    }

    pub async fn batch_status(&self, batch_id: Uuid) -> Option<BatchRunStatus> {
        self.registry().status(batch_id).await
    }

    /// Cache-or-fetch one part, reporting failures
    pub async fn enrich_one_part(&self, element_id: &str) -> Result<PartMetadata, EnrichError> {
        let element_id = element_id.trim();
        outcome_to_result(self.part_fetcher.fetch(element_id).await)?;
        self.cache
            .get_part(element_id)
            .await?
            .ok_or_else(|| EnrichError::Upstream(format!("part {} was not stored", element_id)))
    }

    /// Cache-or-fetch one minifig, reporting failures
    ///
    /// A 404, fresh or remembered from an earlier lookup, is reported as
    /// [`EnrichError::NotFound`].
    pub async fn enrich_one_minifig(&self, minifig_id: &str) -> Result<MinifigMetadata, EnrichError> {
        let minifig_id = minifig_id.trim();
        match self.minifig_fetcher.fetch(minifig_id).await {
            FetchOutcome::Invalid => return Err(EnrichError::NotFound(minifig_id.to_string())),
            outcome => outcome_to_result(outcome)?,
        }
        match self.cache.get_minifig(minifig_id).await? {
            Some(fig) if fig.invalid => Err(EnrichError::NotFound(minifig_id.to_string())),
            Some(fig) => Ok(fig),
            None => Err(EnrichError::Upstream(format!("minifig {} was not stored", minifig_id))),
        }
    }

    pub async fn get_part_metadata(&self, element_id: &str) -> brickvault_common::Result<Option<PartMetadata>> {
        self.cache.get_part(element_id).await
    }

    pub async fn get_minifig_price_with_trend(&self, minifig: &MinifigRef) -> PriceWithTrend {
        self.price_service.get_latest_price(minifig).await
    }

    pub async fn join_user_records_with_metadata(
        &self,
        records: Vec<UserOwnedRecord>,
    ) -> brickvault_common::Result<Vec<EnrichedRecord>> {
        read_path::join_user_records_with_metadata(&self.cache, records).await
    }

    /// Enriched records of one owner's table
    pub async fn list_table_records(
        &self,
        table_id: &str,
        owner_id: &str,
    ) -> brickvault_common::Result<Vec<EnrichedRecord>> {
        let records = records::list_records(self.cache.pool(), table_id, owner_id).await?;
        self.join_user_records_with_metadata(records).await
    }

    /// Add a record to a table and schedule enrichment of its id
    pub async fn add_record(&self, new: NewRecord) -> brickvault_common::Result<(UserOwnedRecord, EnrichAccepted)> {
        let record = UserOwnedRecord::from_new(new);
        if record.item_id.is_empty() {
            return Err(brickvault_common::Error::InvalidInput("item id must not be empty".to_string()));
        }

        records::insert_record(self.cache.pool(), &record).await?;
        let accepted = self.schedule_for_record(&record).await;
        Ok((record, accepted))
    }

    /// Point a record at a new id and schedule enrichment of that id
    ///
    /// The record's `invalid` flag is cleared; the new id is checked
    /// upstream by the background run.
    pub async fn change_record_item(
        &self,
        uuid: Uuid,
        item_id: &str,
    ) -> brickvault_common::Result<(UserOwnedRecord, EnrichAccepted)> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(brickvault_common::Error::InvalidInput("item id must not be empty".to_string()));
        }

        let record = records::update_item_id(self.cache.pool(), uuid, item_id).await?;
        let accepted = self.schedule_for_record(&record).await;
        Ok((record, accepted))
    }

    async fn schedule_for_record(&self, record: &UserOwnedRecord) -> EnrichAccepted {
        let kind = match record.kind {
            RecordKind::Brick => EnrichmentKind::Parts,
            RecordKind::Minifig => EnrichmentKind::Minifigs,
        };

        self.enrich_batch(
            kind,
            vec![record.item_id.clone()],
            Some(record.table_id.clone()),
            Some(record.owner_id.clone()),
        )
        .await
    }
}

fn outcome_to_result(outcome: FetchOutcome) -> Result<(), EnrichError> {
    match outcome {
        FetchOutcome::Cached | FetchOutcome::Stored | FetchOutcome::Invalid | FetchOutcome::Incomplete => Ok(()),
        FetchOutcome::RateLimited => Err(EnrichError::RateLimited),
        FetchOutcome::Failed(reason) => Err(EnrichError::Upstream(reason)),
    }
}
