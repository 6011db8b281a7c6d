//! Part colors fetcher
//!
//! Cache first, then the catalog. A 404 stores a terminal invalid entry
//! and flags every record referencing the id; an empty color list stores an
//! incomplete entry that later passes will retry.

use brickvault_common::events::{BrickEvent, EventBus};
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use std::sync::Arc;

use super::cache_manager::MetadataCache;
use super::inflight::InFlight;
use super::sources::{PartsCatalog, SourceError};
use crate::db::records;
use crate::models::{FetchOutcome, PartMetadata, RecordKind};

/// Whether a stored part satisfies a lookup at `now`
///
/// Invalid entries never expire as hits; complete entries do once stale.
pub fn is_part_hit(part: &PartMetadata, now: DateTime<Utc>) -> bool {
    part.invalid || (part.is_cache_hit() && !part.is_stale_at(now))
}

pub struct PartFetcher {
    cache: Arc<MetadataCache>,
    catalog: Arc<dyn PartsCatalog>,
    events: EventBus,
    ttl: Duration,
    inflight: InFlight<FetchOutcome>,
}

impl PartFetcher {
    pub fn new(cache: Arc<MetadataCache>, catalog: Arc<dyn PartsCatalog>, events: EventBus, ttl: Duration) -> Self {
        Self {
            cache,
            catalog,
            events,
            ttl,
            inflight: InFlight::new(),
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Cache-or-fetch for one element id
    pub async fn fetch(self: &Arc<Self>, element_id: &str) -> FetchOutcome {
        match self.cache.get_part(element_id).await {
            Ok(Some(part)) if is_part_hit(&part, Utc::now()) => return FetchOutcome::Cached,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(element_id = %element_id, error = %e, "Cache read failed, fetching upstream");
            }
        }

        let this = Arc::clone(self);
        let id = element_id.to_string();
        self.inflight
            .run(element_id, move || async move { this.fetch_upstream(&id).await }.boxed())
            .await
    }

    async fn fetch_upstream(&self, element_id: &str) -> FetchOutcome {
        match self.catalog.part_colors(element_id).await {
            Ok(found) => {
                let part = PartMetadata::with_colors(element_id, found.element_name, found.colors, self.ttl);
                let incomplete = part.cache_incomplete;

                if let Err(e) = self.cache.put_part(part).await {
                    tracing::error!(element_id = %element_id, error = %e, "Failed to store part metadata");
                    return FetchOutcome::Failed(e.to_string());
                }

                if incomplete {
                    tracing::debug!(element_id = %element_id, "Catalog returned no colors, stored incomplete");
                    FetchOutcome::Incomplete
                } else {
                    FetchOutcome::Stored
                }
            }
            Err(SourceError::NotFound(_)) => self.mark_invalid(element_id).await,
            Err(SourceError::RateLimited { .. }) => {
                tracing::warn!(element_id = %element_id, "Catalog rate limited part lookup");
                FetchOutcome::RateLimited
            }
            Err(e) => {
                tracing::warn!(element_id = %element_id, error = %e, "Part lookup failed");
                FetchOutcome::Failed(e.to_string())
            }
        }
    }

    async fn mark_invalid(&self, element_id: &str) -> FetchOutcome {
        if let Err(e) = self.cache.put_part(PartMetadata::invalid(element_id, self.ttl)).await {
            tracing::error!(element_id = %element_id, error = %e, "Failed to store invalid part");
            return FetchOutcome::Failed(e.to_string());
        }

        match records::set_invalid_for_items(self.cache.pool(), RecordKind::Brick, &[element_id.to_string()]).await {
            Ok(touched) => {
                tracing::info!(element_id = %element_id, records = touched, "Part id not found upstream, marked invalid")
            }
            Err(e) => tracing::warn!(element_id = %element_id, error = %e, "Failed to flag records invalid"),
        }

        self.events.emit_lossy(BrickEvent::PartInvalidated {
            element_id: element_id.to_string(),
            timestamp: Utc::now(),
        });

        FetchOutcome::Invalid
    }
}
