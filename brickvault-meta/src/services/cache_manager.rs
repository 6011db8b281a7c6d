//! Metadata cache manager
//!
//! Constructed once per process and shared by the fetchers, the
//! orchestrator and the read path. Holds an in-memory layer over the SQLite
//! stores; SQLite stays the source of truth and every write goes to it
//! first (write-through).

use brickvault_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::{minifigs, parts};
use crate::models::{MinifigMetadata, PartMetadata};

pub struct MetadataCache {
    pool: SqlitePool,
    parts: RwLock<HashMap<String, PartMetadata>>,
    minifigs: RwLock<HashMap<String, MinifigMetadata>>,
}

impl MetadataCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            parts: RwLock::new(HashMap::new()),
            minifigs: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_part(&self, element_id: &str) -> Result<Option<PartMetadata>> {
        if let Some(part) = self.parts.read().await.get(element_id) {
            return Ok(Some(part.clone()));
        }

        let loaded = parts::get_part(&self.pool, element_id).await?;
        if let Some(part) = &loaded {
            self.parts.write().await.insert(part.element_id.clone(), part.clone());
        }
        Ok(loaded)
    }

    /// Look up many ids; memory first, then one store query for the rest
    pub async fn get_parts(&self, element_ids: &[String]) -> Result<HashMap<String, PartMetadata>> {
        let mut found = HashMap::new();
        let mut missing = Vec::new();
        {
            let memory = self.parts.read().await;
            for id in element_ids {
                match memory.get(id) {
                    Some(part) => {
                        found.insert(id.clone(), part.clone());
                    }
                    None => missing.push(id.clone()),
                }
            }
        }

        if !missing.is_empty() {
            let loaded = parts::get_parts(&self.pool, &missing).await?;
            let mut memory = self.parts.write().await;
            for (id, part) in loaded {
                memory.insert(id.clone(), part.clone());
                found.insert(id, part);
            }
        }

        Ok(found)
    }

    pub async fn put_part(&self, part: PartMetadata) -> Result<()> {
        parts::upsert_part(&self.pool, &part).await?;
        self.parts.write().await.insert(part.element_id.clone(), part);
        Ok(())
    }

    pub async fn get_minifig(&self, minifig_id: &str) -> Result<Option<MinifigMetadata>> {
        if let Some(fig) = self.minifigs.read().await.get(minifig_id) {
            return Ok(Some(fig.clone()));
        }

        let loaded = minifigs::get_minifig(&self.pool, minifig_id).await?;
        if let Some(fig) = &loaded {
            self.minifigs
                .write()
                .await
                .insert(fig.minifig_id_rebrickable.clone(), fig.clone());
        }
        Ok(loaded)
    }

    pub async fn get_minifigs(&self, minifig_ids: &[String]) -> Result<HashMap<String, MinifigMetadata>> {
        let mut found = HashMap::new();
        let mut missing = Vec::new();
        {
            let memory = self.minifigs.read().await;
            for id in minifig_ids {
                match memory.get(id) {
                    Some(fig) => {
                        found.insert(id.clone(), fig.clone());
                    }
                    None => missing.push(id.clone()),
                }
            }
        }

        if !missing.is_empty() {
            let loaded = minifigs::get_minifigs(&self.pool, &missing).await?;
            let mut memory = self.minifigs.write().await;
            for (id, fig) in loaded {
                memory.insert(id.clone(), fig.clone());
                found.insert(id, fig);
            }
        }

        Ok(found)
    }

    /// Store name/image; a resolved marketplace id already cached survives
    pub async fn put_minifig(&self, minifig: MinifigMetadata) -> Result<()> {
        minifigs::upsert_minifig(&self.pool, &minifig).await?;
        // Reload so the memory layer reflects the preserved marketplace id
        self.minifigs.write().await.remove(&minifig.minifig_id_rebrickable);
        self.get_minifig(&minifig.minifig_id_rebrickable).await?;
        Ok(())
    }

    /// Permanently record a resolved marketplace id
    pub async fn set_bricklink_id(&self, minifig_id: &str, bricklink_id: &str) -> Result<()> {
        minifigs::set_bricklink_id(&self.pool, minifig_id, bricklink_id).await?;
        self.minifigs.write().await.remove(minifig_id);
        self.get_minifig(minifig_id).await?;
        Ok(())
    }

    /// Drop in-memory entries so the next read goes to the store
    pub async fn evict(&self, id: &str) {
        self.parts.write().await.remove(id);
        self.minifigs.write().await.remove(id);
    }
}
