//! Minifig metadata fetcher

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use std::sync::Arc;

use super::cache_manager::MetadataCache;
use super::inflight::InFlight;
use super::sources::{PartsCatalog, SourceError};
use crate::db::records;
use crate::models::{FetchOutcome, MinifigMetadata, RecordKind};

/// Whether a stored minifig satisfies a lookup at `now`
///
/// Invalid entries are terminal hits. A row created only to hold a
/// marketplace id has no name yet and is a miss.
pub fn is_minifig_hit(minifig: &MinifigMetadata, now: DateTime<Utc>) -> bool {
    minifig.invalid || (!minifig.minifig_name.is_empty() && !minifig.is_stale_at(now))
}

pub struct MinifigFetcher {
    cache: Arc<MetadataCache>,
    catalog: Arc<dyn PartsCatalog>,
    ttl: Duration,
    inflight: InFlight<FetchOutcome>,
}

impl MinifigFetcher {
    pub fn new(cache: Arc<MetadataCache>, catalog: Arc<dyn PartsCatalog>, ttl: Duration) -> Self {
        Self {
            cache,
            catalog,
            ttl,
            inflight: InFlight::new(),
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub async fn fetch(self: &Arc<Self>, minifig_id: &str) -> FetchOutcome {
        match self.cache.get_minifig(minifig_id).await {
            Ok(Some(fig)) if is_minifig_hit(&fig, Utc::now()) => return FetchOutcome::Cached,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(minifig_id = %minifig_id, error = %e, "Cache read failed, fetching upstream");
            }
        }

        let this = Arc::clone(self);
        let id = minifig_id.to_string();
        self.inflight
            .run(minifig_id, move || async move { this.fetch_upstream(&id).await }.boxed())
            .await
    }

    async fn fetch_upstream(&self, minifig_id: &str) -> FetchOutcome {
        match self.catalog.minifig(minifig_id).await {
            Ok(details) => {
                let fig = MinifigMetadata {
                    minifig_id_rebrickable: minifig_id.to_string(),
                    minifig_name: details.name,
                    minifig_image: details.image_url.unwrap_or_default(),
                    minifig_id_bricklink: None,
                    invalid: false,
                    expires_at: Utc::now() + self.ttl,
                };

                match self.cache.put_minifig(fig).await {
                    Ok(()) => FetchOutcome::Stored,
                    Err(e) => {
                        tracing::error!(minifig_id = %minifig_id, error = %e, "Failed to store minifig metadata");
                        FetchOutcome::Failed(e.to_string())
                    }
                }
            }
            Err(SourceError::NotFound(_)) => {
                if let Err(e) = self.cache.put_minifig(MinifigMetadata::invalid(minifig_id, self.ttl)).await {
                    tracing::error!(minifig_id = %minifig_id, error = %e, "Failed to store invalid minifig");
                    return FetchOutcome::Failed(e.to_string());
                }
                match records::set_invalid_for_items(self.cache.pool(), RecordKind::Minifig, &[minifig_id.to_string()])
                    .await
                {
                    Ok(touched) => {
                        tracing::info!(minifig_id = %minifig_id, records = touched, "Minifig id not found upstream")
                    }
                    Err(e) => tracing::warn!(minifig_id = %minifig_id, error = %e, "Failed to flag records invalid"),
                }
                FetchOutcome::Invalid
            }
            Err(SourceError::RateLimited { .. }) => {
                tracing::warn!(minifig_id = %minifig_id, "Catalog rate limited minifig lookup");
                FetchOutcome::RateLimited
            }
            Err(e) => {
                tracing::warn!(minifig_id = %minifig_id, error = %e, "Minifig lookup failed");
                FetchOutcome::Failed(e.to_string())
            }
        }
    }
}
