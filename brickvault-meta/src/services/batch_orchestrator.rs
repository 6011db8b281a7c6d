//! Batch enrichment orchestrator
//!
//! State per batch: `PENDING → CHECK_CACHE → FETCH → (RATE_LIMITED | DONE)`,
//! then the next batch or `COMPLETE`.
//!
//! 1. Partition the input into fixed-size batches.
//! 2. Per batch, look every id up in the cache at once; hits are applied to
//!    the user records straight away.
//! 3. Misses are fetched concurrently within the batch. Batches run strictly
//!    one after another.
//! 4. After a batch that saw a rate-limit signal the pause before the next
//!    batch is the long cooldown, otherwise the standard one.
//! 5. An id is handled at most once per run, even if it reappears later.
//!
//! A single id failing never aborts the batch or the run.

use async_trait::async_trait;
use brickvault_common::events::{BrickEvent, EnrichmentKind, EventBus};
use brickvault_common::Result;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use super::batch_registry::BatchRegistry;
use crate::models::{BatchPhase, BatchReport, FetchOutcome, RunReport};

/// One kind of enrichment the orchestrator can drive
#[async_trait]
pub trait BatchEnricher: Send + Sync {
    fn kind(&self) -> EnrichmentKind;

    /// Split `ids` into `(hits, misses)` with one store query
    async fn partition_cached(&self, ids: &[String]) -> Result<(Vec<String>, Vec<String>)>;

    /// Bring user records in line with cached metadata for `hits`
    async fn apply_hits(&self, hits: &[String]) -> Result<()>;

    /// Fetch one cache miss upstream and store the result
    async fn fetch_miss(&self, id: &str) -> FetchOutcome;
}

/// Sizes and pauses for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub standard_cooldown: Duration,
    pub rate_limited_cooldown: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            standard_cooldown: Duration::from_secs(6),
            rate_limited_cooldown: Duration::from_secs(120),
        }
    }
}

impl BatchConfig {
    /// Price-only runs use a shorter standard pause
    pub fn for_prices(self, price_cooldown: Duration) -> Self {
        Self {
            standard_cooldown: price_cooldown,
            ..self
        }
    }
}

/// Split `ids` into nominal batches, then drop ids already seen earlier in
/// the run and batches left empty by that
pub fn plan_batches(ids: &[String], batch_size: usize) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();

    ids.chunks(batch_size.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .filter(|id| seen.insert(id.to_string()))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|batch| !batch.is_empty())
        .collect()
}

pub struct BatchOrchestrator {
    registry: BatchRegistry,
    events: EventBus,
}

impl BatchOrchestrator {
    pub fn new(registry: BatchRegistry, events: EventBus) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &BatchRegistry {
        &self.registry
    }

    /// Drive every batch of one run to completion
    pub async fn run(
        &self,
        batch_id: Uuid,
        enricher: &dyn BatchEnricher,
        ids: &[String],
        config: BatchConfig,
    ) -> RunReport {
        let kind = enricher.kind();
        let batches = plan_batches(ids, config.batch_size);
        let total_ids: usize = batches.iter().map(Vec::len).sum();
        let batch_count = batches.len();
        let mut report = RunReport::default();

        tracing::info!(
            batch_id = %batch_id,
            kind = kind.as_str(),
            total_ids,
            batches = batch_count,
            "Enrichment run started"
        );

        for (index, batch) in batches.into_iter().enumerate() {
            let mut batch_report = self.run_one_batch(batch_id, enricher, batch).await;
            let is_last = index + 1 == batch_count;

            if !is_last {
                batch_report.cooldown_after = Some(if batch_report.rate_limited {
                    config.rate_limited_cooldown
                } else {
                    config.standard_cooldown
                });
            }

            let processed_so_far = report.processed() + batch_report.ids.len();
            self.registry
                .update(batch_id, |s| {
                    s.phase = if batch_report.rate_limited {
                        BatchPhase::RateLimited
                    } else {
                        BatchPhase::Done
                    };
                    s.processed = processed_so_far;
                    s.cache_hits += batch_report.cache_hits;
                    s.fetched += batch_report.fetched;
                    s.invalid += batch_report.invalid;
                    s.incomplete += batch_report.incomplete;
                    s.failed += batch_report.failed;
                    s.batches_completed += 1;
                    if batch_report.rate_limited {
                        s.rate_limited_batches += 1;
                    }
                })
                .await;

            self.events.emit_lossy(BrickEvent::EnrichmentBatchCompleted {
                batch_id,
                kind,
                batch_index: index,
                processed: processed_so_far,
                total_ids,
                rate_limited: batch_report.rate_limited,
                timestamp: Utc::now(),
            });

            let cooldown = batch_report.cooldown_after;
            report.batches.push(batch_report);

            if let Some(cooldown) = cooldown {
                tracing::debug!(
                    batch_id = %batch_id,
                    batch_index = index,
                    cooldown_ms = cooldown.as_millis() as u64,
                    "Cooling down before next batch"
                );
                tokio::time::sleep(cooldown).await;
            }
        }

        self.registry.update(batch_id, |s| s.phase = BatchPhase::Complete).await;

        tracing::info!(
            batch_id = %batch_id,
            kind = kind.as_str(),
            processed = report.processed(),
            failed = report.failed(),
            "Enrichment run finished"
        );

        report
    }

    async fn run_one_batch(&self, batch_id: Uuid, enricher: &dyn BatchEnricher, ids: Vec<String>) -> BatchReport {
        let mut report = BatchReport {
            ids,
            ..BatchReport::default()
        };

        self.registry.update(batch_id, |s| s.phase = BatchPhase::CheckCache).await;
        let (hits, misses) = match enricher.partition_cached(&report.ids).await {
            Ok(split) => split,
            Err(e) => {
                tracing::warn!(batch_id = %batch_id, error = %e, "Cache check failed, treating batch as misses");
                (Vec::new(), report.ids.clone())
            }
        };

        report.cache_hits = hits.len();
        if !hits.is_empty() {
            tracing::debug!(batch_id = %batch_id, hits = hits.len(), "Applying cached metadata");
            if let Err(e) = enricher.apply_hits(&hits).await {
                tracing::warn!(batch_id = %batch_id, error = %e, "Failed to apply cached metadata");
            }
        }

        self.registry.update(batch_id, |s| s.phase = BatchPhase::Fetch).await;
        let outcomes = join_all(misses.iter().map(|id| enricher.fetch_miss(id))).await;

        for (id, outcome) in misses.iter().zip(outcomes) {
            match outcome {
                FetchOutcome::Cached => report.cache_hits += 1,
                FetchOutcome::Stored => report.fetched += 1,
                FetchOutcome::Invalid => report.invalid += 1,
                FetchOutcome::Incomplete => report.incomplete += 1,
                FetchOutcome::RateLimited => {
                    report.rate_limited = true;
                    report.failed += 1;
                }
                FetchOutcome::Failed(reason) => {
                    tracing::warn!(batch_id = %batch_id, id = %id, reason = %reason, "Enrichment failed for id");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_plan_batches_sizes() {
        let input: Vec<String> = (0..23).map(|i| format!("id-{}", i)).collect();
        let sizes: Vec<usize> = plan_batches(&input, 5).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 5, 5, 3]);
    }

    #[test]
    fn test_plan_batches_skips_repeats_across_batches() {
        let planned = plan_batches(&ids(&["a", "b", "a", "c", "b", "b"]), 2);
        assert_eq!(planned, vec![ids(&["a", "b"]), ids(&["c"])]);
    }

    #[test]
    fn test_plan_batches_ignores_blank_ids() {
        let planned = plan_batches(&ids(&[" 3001 ", "", "  "]), 5);
        assert_eq!(planned, vec![ids(&["3001"])]);
    }
}
