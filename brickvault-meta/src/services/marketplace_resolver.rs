//! Catalog minifig id → marketplace id resolution
//!
//! 1. pick the set with the lowest numeric set number containing the minifig
//! 2. scrape that set's marketplace inventory page
//! 3. fuzzy-match the minifig name against every minifig row
//! 4. cache the winning id permanently
//!
//! This is the most expensive lookup in the system, so a cached id is
//! always used when present.

use std::sync::Arc;

use super::cache_manager::MetadataCache;
use super::name_matcher::{best_match, NameScorer};
use super::sources::{Marketplace, PartsCatalog, SetSummary, SourceError, SourceResult};
use crate::models::MinifigRef;

pub struct MarketplaceResolver {
    cache: Arc<MetadataCache>,
    catalog: Arc<dyn PartsCatalog>,
    marketplace: Arc<dyn Marketplace>,
    scorer: Arc<dyn NameScorer>,
}

impl MarketplaceResolver {
    pub fn new(
        cache: Arc<MetadataCache>,
        catalog: Arc<dyn PartsCatalog>,
        marketplace: Arc<dyn Marketplace>,
        scorer: Arc<dyn NameScorer>,
    ) -> Self {
        Self {
            cache,
            catalog,
            marketplace,
            scorer,
        }
    }

    pub async fn resolve(&self, minifig: &MinifigRef) -> SourceResult<String> {
        let minifig_id = minifig.minifig_id_rebrickable.as_str();

        if let Some(known) = &minifig.minifig_id_bricklink {
            return Ok(known.clone());
        }

        let cached = match self.cache.get_minifig(minifig_id).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(minifig_id = %minifig_id, error = %e, "Cache read failed during resolution");
                None
            }
        };
        if let Some(known) = cached.as_ref().and_then(|c| c.minifig_id_bricklink.clone()) {
            return Ok(known);
        }
        if cached.as_ref().is_some_and(|c| c.invalid) {
            return Err(SourceError::NotFound(minifig_id.to_string()));
        }

        let name = match minifig
            .minifig_name
            .clone()
            .or_else(|| cached.map(|c| c.minifig_name).filter(|n| !n.is_empty()))
        {
            Some(name) => name,
            None => self.catalog.minifig(minifig_id).await?.name,
        };

        let sets = self.catalog.minifig_sets(minifig_id).await?;
        let set = lowest_numbered_set(&sets)
            .ok_or_else(|| SourceError::NotFound(format!("no sets contain {}", minifig_id)))?;

        let rows = self.marketplace.set_inventory(&set.set_num).await?;
        let matched = best_match(self.scorer.as_ref(), &name, &rows).ok_or_else(|| {
            SourceError::NotFound(format!("no minifig in set {} matches {}", set.set_num, name))
        })?;
        let bricklink_id = matched.row.item_id.clone();

        tracing::info!(
            minifig_id = %minifig_id,
            bricklink_id = %bricklink_id,
            set_num = %set.set_num,
            score = matched.score,
            "Resolved marketplace id"
        );

        if let Err(e) = self.cache.set_bricklink_id(minifig_id, &bricklink_id).await {
            tracing::warn!(minifig_id = %minifig_id, error = %e, "Failed to cache marketplace id");
        }

        Ok(bricklink_id)
    }
}

/// Set with the smallest numeric set number (`"10188-1"` → 10188)
///
/// Sets without a numeric prefix are only used when no numeric one exists.
pub(crate) fn lowest_numbered_set(sets: &[SetSummary]) -> Option<&SetSummary> {
    sets.iter()
        .min_by_key(|s| (set_number(&s.set_num).unwrap_or(u64::MAX), s.set_num.clone()))
}

fn set_number(set_num: &str) -> Option<u64> {
    let digits: String = set_num.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(num: &str) -> SetSummary {
        SetSummary {
            set_num: num.to_string(),
            name: String::new(),
        }
    }

    #[test]
    fn test_lowest_numbered_set_compares_numerically() {
        let sets = vec![set("75192-1"), set("9493-1"), set("10188-1")];
        assert_eq!(lowest_numbered_set(&sets).unwrap().set_num, "9493-1");
    }

    #[test]
    fn test_non_numeric_sets_are_last_resort() {
        let sets = vec![set("SWCOMIC-1"), set("75000-1")];
        assert_eq!(lowest_numbered_set(&sets).unwrap().set_num, "75000-1");

        let only = vec![set("SWCOMIC-1")];
        assert_eq!(lowest_numbered_set(&only).unwrap().set_num, "SWCOMIC-1");
        assert!(lowest_numbered_set(&[]).is_none());
    }
}
