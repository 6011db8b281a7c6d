//! Batch enrichment run state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use brickvault_common::events::EnrichmentKind;

/// Per-batch state machine
///
/// `Pending → CheckCache → Fetch → (RateLimited | Done)`; the run moves to
/// the next batch or completes after `Done`/`RateLimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchPhase {
    Pending,
    CheckCache,
    Fetch,
    RateLimited,
    Done,
    Complete,
}

/// Whole-run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Completed,
    /// The task itself died (panic or store failure outside a single id)
    Failed,
}

/// Acknowledgement returned to the caller of `enrich_batch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichAccepted {
    pub accepted: bool,
    pub batch_id: Uuid,
}

/// Live status of a run, kept in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRunStatus {
    pub batch_id: Uuid,
    pub kind: EnrichmentKind,
    /// Table and owner that triggered the run, when known
    pub table_id: Option<String>,
    pub owner_id: Option<String>,
    pub state: RunState,
    pub phase: BatchPhase,
    pub total_ids: usize,
    pub processed: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub invalid: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub batches_completed: usize,
    pub rate_limited_batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl BatchRunStatus {
    pub fn new(batch_id: Uuid, kind: EnrichmentKind, total_ids: usize) -> Self {
        Self {
            batch_id,
            kind,
            table_id: None,
            owner_id: None,
            state: RunState::Running,
            phase: BatchPhase::Pending,
            total_ids,
            processed: 0,
            cache_hits: 0,
            fetched: 0,
            invalid: 0,
            incomplete: 0,
            failed: 0,
            batches_completed: 0,
            rate_limited_batches: 0,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn with_scope(mut self, table_id: Option<String>, owner_id: Option<String>) -> Self {
        self.table_id = table_id;
        self.owner_id = owner_id;
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RunState::Completed | RunState::Failed)
    }
}

/// Result of one cache-or-fetch for a single id
///
/// Only `RateLimited` and `Failed` leave the id without a stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Already satisfied by the cache; no upstream call
    Cached,
    /// Fetched and stored complete
    Stored,
    /// Upstream confirmed the id missing; stored as invalid
    Invalid,
    /// Stored with partial data; a later pass will retry
    Incomplete,
    /// Upstream rate limited the request
    RateLimited,
    /// Transient or malformed-response failure after retries
    Failed(String),
}

/// What happened in one batch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    /// Ids dispatched in this batch after run-level deduplication
    pub ids: Vec<String>,
    pub cache_hits: usize,
    pub fetched: usize,
    pub invalid: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub rate_limited: bool,
    /// Pause taken before the next batch, `None` after the last one
    pub cooldown_after: Option<Duration>,
}

/// Outcome of a complete run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub batches: Vec<BatchReport>,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.batches.iter().map(|b| b.ids.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(|b| b.failed).sum()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.iter().map(|b| b.ids.len()).collect()
    }
}
