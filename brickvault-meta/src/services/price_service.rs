//! Price freshness and trend service
//!
//! A live snapshot inside its expiry window is served as-is with trends
//! against the newest history row. Otherwise the marketplace id is resolved
//! (if unknown), a fresh price is fetched, the superseded snapshot is
//! archived and the new one written. Lookup failures degrade to a zeroed
//! price with no trend; callers never see an error.

use brickvault_common::events::{BrickEvent, EventBus};
use brickvault_common::Result;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::inflight::InFlight;
use super::marketplace_resolver::MarketplaceResolver;
use super::sources::{Marketplace, PriceLookup, SourceError};
use crate::db::prices::{self, ArchiveRow};
use crate::db::price_history;
use crate::models::{MinifigRef, PriceData, PriceSnapshot, PriceTrends, PriceWithTrend};

/// Outcome of a forced refresh
#[derive(Debug, Clone, PartialEq)]
pub enum PriceRefresh {
    Refreshed(PriceWithTrend),
    RateLimited,
    Failed(String),
}

pub struct PriceService {
    pool: SqlitePool,
    resolver: Arc<MarketplaceResolver>,
    marketplace: Arc<dyn Marketplace>,
    events: EventBus,
    ttl: Duration,
    history_multiplier: i32,
    inflight: InFlight<PriceRefresh>,
}

impl PriceService {
    pub fn new(
        pool: SqlitePool,
        resolver: Arc<MarketplaceResolver>,
        marketplace: Arc<dyn Marketplace>,
        events: EventBus,
        ttl: Duration,
        history_multiplier: i32,
    ) -> Self {
        Self {
            pool,
            resolver,
            marketplace,
            events,
            ttl,
            history_multiplier: history_multiplier.max(1),
            inflight: InFlight::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Latest price with trends; never fails
    pub async fn get_latest_price(self: &Arc<Self>, minifig: &MinifigRef) -> PriceWithTrend {
        self.get_latest_price_at(minifig, Utc::now()).await
    }

    pub async fn get_latest_price_at(self: &Arc<Self>, minifig: &MinifigRef, now: DateTime<Utc>) -> PriceWithTrend {
        match self.fresh_snapshot_with_trend(&minifig.minifig_id_rebrickable, now).await {
            Ok(Some(cached)) => return cached,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(minifig_id = %minifig.minifig_id_rebrickable, error = %e, "Price cache read failed")
            }
        }

        match self.refresh_at(minifig, now).await {
            PriceRefresh::Refreshed(price) => price,
            PriceRefresh::RateLimited | PriceRefresh::Failed(_) => zeroed(minifig),
        }
    }

    /// Live snapshot still inside its window, with trends
    pub async fn fresh_snapshot_with_trend(&self, minifig_id: &str, now: DateTime<Utc>) -> Result<Option<PriceWithTrend>> {
        let Some(snapshot) = prices::get_snapshot(&self.pool, minifig_id).await? else {
            return Ok(None);
        };
        if !snapshot.is_fresh_at(now) {
            return Ok(None);
        }

        tracing::debug!(minifig_id = %minifig_id, "Serving cached price");
        let bricklink_id = crate::db::minifigs::get_minifig(&self.pool, minifig_id)
            .await?
            .and_then(|m| m.minifig_id_bricklink);
        let trends = self.trends_against_history(minifig_id, &snapshot.price_data).await?;

        Ok(Some(PriceWithTrend {
            minifig_id_rebrickable: snapshot.minifig_id_rebrickable,
            minifig_id_bricklink: bricklink_id,
            price: snapshot.price_data,
            trends,
            fetched_at: Some(snapshot.fetched_at),
            expires_at: Some(snapshot.expires_at),
        }))
    }

    /// Fetch and store a new price regardless of freshness
    ///
    /// Concurrent refreshes of the same minifig share one upstream call.
    pub async fn refresh_at(self: &Arc<Self>, minifig: &MinifigRef, now: DateTime<Utc>) -> PriceRefresh {
        let this = Arc::clone(self);
        let minifig_owned = minifig.clone();
        self.inflight
            .run(&minifig.minifig_id_rebrickable, move || {
                async move { this.refresh_uncoalesced(&minifig_owned, now).await }.boxed()
            })
            .await
    }

    async fn refresh_uncoalesced(&self, minifig: &MinifigRef, now: DateTime<Utc>) -> PriceRefresh {
        let minifig_id = minifig.minifig_id_rebrickable.as_str();

        let bricklink_id = match self.resolver.resolve(minifig).await {
            Ok(id) => id,
            Err(SourceError::RateLimited { .. }) => return PriceRefresh::RateLimited,
            Err(e) => {
                tracing::warn!(minifig_id = %minifig_id, error = %e, "Could not resolve marketplace id");
                return PriceRefresh::Failed(e.to_string());
            }
        };

        let price_data = match self.marketplace.price_by_id(&bricklink_id).await {
            Ok(PriceLookup::Found(data)) => data,
            Ok(PriceLookup::RateLimited) | Err(SourceError::RateLimited { .. }) => return PriceRefresh::RateLimited,
            Err(e) => {
                tracing::warn!(minifig_id = %minifig_id, bricklink_id = %bricklink_id, error = %e, "Price fetch failed");
                return PriceRefresh::Failed(e.to_string());
            }
        };

        match self.store_refreshed(minifig_id, &bricklink_id, price_data, now).await {
            Ok(price) => {
                self.events.emit_lossy(BrickEvent::PriceRefreshed {
                    minifig_id: minifig_id.to_string(),
                    timestamp: Utc::now(),
                });
                PriceRefresh::Refreshed(price)
            }
            Err(e) => {
                tracing::error!(minifig_id = %minifig_id, error = %e, "Failed to store price snapshot");
                PriceRefresh::Failed(e.to_string())
            }
        }
    }

    /// Archive-then-overwrite, then trends against the newest history row
    async fn store_refreshed(
        &self,
        minifig_id: &str,
        bricklink_id: &str,
        price_data: PriceData,
        now: DateTime<Utc>,
    ) -> Result<PriceWithTrend> {
        let previous = prices::get_snapshot(&self.pool, minifig_id).await?;
        let latest_history = price_history::latest_entry(&self.pool, minifig_id).await?;

        let archive_due = latest_history
            .as_ref()
            .map_or(true, |entry| now - entry.created_at > self.ttl / 2);
        let archive = previous.filter(|_| archive_due).map(|old| ArchiveRow {
            price_data: old.price_data,
            created_at: now,
            expires_at: now + self.ttl * self.history_multiplier,
        });
        if archive.is_some() {
            tracing::debug!(minifig_id = %minifig_id, "Archiving superseded price snapshot");
        }

        let snapshot = PriceSnapshot {
            minifig_id_rebrickable: minifig_id.to_string(),
            price_data,
            is_expired: false,
            fetched_at: now,
            expires_at: now + self.ttl,
        };
        prices::archive_and_replace(&self.pool, &snapshot, archive).await?;

        let purged = price_history::purge_expired(&self.pool, now).await?;
        if purged > 0 {
            tracing::debug!(minifig_id = %minifig_id, purged, "Purged expired price history");
        }

        let trends = self.trends_against_history(minifig_id, &snapshot.price_data).await?;

        tracing::info!(minifig_id = %minifig_id, bricklink_id = %bricklink_id, "Price refreshed");

        Ok(PriceWithTrend {
            minifig_id_rebrickable: snapshot.minifig_id_rebrickable,
            minifig_id_bricklink: Some(bricklink_id.to_string()),
            price: snapshot.price_data,
            trends,
            fetched_at: Some(snapshot.fetched_at),
            expires_at: Some(snapshot.expires_at),
        })
    }

    async fn trends_against_history(&self, minifig_id: &str, current: &PriceData) -> Result<PriceTrends> {
        Ok(price_history::latest_entry(&self.pool, minifig_id)
            .await?
            .map(|entry| PriceTrends::between(current, &entry.price_data))
            .unwrap_or_default())
    }
}

fn zeroed(minifig: &MinifigRef) -> PriceWithTrend {
    PriceWithTrend {
        minifig_id_rebrickable: minifig.minifig_id_rebrickable.clone(),
        minifig_id_bricklink: minifig.minifig_id_bricklink.clone(),
        price: PriceData::zeroed(),
        trends: PriceTrends::default(),
        fetched_at: None,
        expires_at: None,
    }
}
