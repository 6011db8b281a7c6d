//! Process-wide registry of background enrichment runs
//!
//! Keyed by batch id. Holds the spawned task handle and the live status so
//! runs can be queried after the triggering request has returned. Finished
//! runs stay in the registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::BatchRunStatus;

struct RunEntry {
    status: BatchRunStatus,
    handle: Option<JoinHandle<()>>,
}

#[derive(Clone, Default)]
pub struct BatchRegistry {
    runs: Arc<RwLock<HashMap<Uuid, RunEntry>>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, status: BatchRunStatus) {
        self.runs
            .write()
            .await
            .insert(status.batch_id, RunEntry { status, handle: None });
    }

    pub async fn attach_handle(&self, batch_id: Uuid, handle: JoinHandle<()>) {
        if let Some(entry) = self.runs.write().await.get_mut(&batch_id) {
            entry.handle = Some(handle);
        }
    }

    /// Apply `f` to the status of `batch_id`, if registered
    pub async fn update<F>(&self, batch_id: Uuid, f: F)
    where
        F: FnOnce(&mut BatchRunStatus),
    {
        if let Some(entry) = self.runs.write().await.get_mut(&batch_id) {
            f(&mut entry.status);
        }
    }

    pub async fn status(&self, batch_id: Uuid) -> Option<BatchRunStatus> {
        self.runs.read().await.get(&batch_id).map(|e| e.status.clone())
    }

    /// All runs, newest first
    pub async fn list(&self) -> Vec<BatchRunStatus> {
        let mut all: Vec<_> = self.runs.read().await.values().map(|e| e.status.clone()).collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }

    /// Runs not yet in a terminal state
    pub async fn active_count(&self) -> usize {
        self.runs
            .read()
            .await
            .values()
            .filter(|e| !e.status.is_terminal())
            .count()
    }

    /// Wait for a run's task to finish and return its final status
    ///
    /// Returns immediately when the handle was already awaited.
    pub async fn wait(&self, batch_id: Uuid) -> Option<BatchRunStatus> {
        let handle = self
            .runs
            .write()
            .await
            .get_mut(&batch_id)
            .and_then(|e| e.handle.take());

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(batch_id = %batch_id, error = %e, "Enrichment task join failed");
            }
        }

        self.status(batch_id).await
    }
}
