//! Upstream data source seams
//!
//! The parts catalog (JSON API) and the marketplace (search endpoint plus
//! scraped inventory pages) sit behind these traits so fetchers, the
//! orchestrator and tests never depend on a concrete HTTP client.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::http_retry::FetchError;
use crate::models::{ColorEntry, PriceData};

#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Upstream confirmed the id does not exist
    #[error("Not found upstream: {0}")]
    NotFound(String),

    /// Upstream still answered 429 after the retry budget
    #[error("Rate limited upstream")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Response did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<FetchError> for SourceError {
    fn from(err: FetchError) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Part name plus every color it is produced in
#[derive(Debug, Clone, PartialEq)]
pub struct PartColors {
    pub element_name: String,
    pub colors: Vec<ColorEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinifigDetails {
    pub minifig_id: String,
    pub name: String,
    pub image_url: Option<String>,
}

/// A set containing a minifig
#[derive(Debug, Clone, PartialEq)]
pub struct SetSummary {
    pub set_num: String,
    pub name: String,
}

/// One minifig row scraped from a marketplace set inventory page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub item_id: String,
    pub name: String,
}

/// Outcome of a marketplace price lookup
///
/// Rate limiting is an expected outcome, not an error, so the orchestrator
/// can widen its cooldown without counting a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceLookup {
    Found(PriceData),
    RateLimited,
}

/// The parts catalog API
#[async_trait]
pub trait PartsCatalog: Send + Sync {
    async fn part_colors(&self, element_id: &str) -> SourceResult<PartColors>;

    async fn minifig(&self, minifig_id: &str) -> SourceResult<MinifigDetails>;

    async fn minifig_sets(&self, minifig_id: &str) -> SourceResult<Vec<SetSummary>>;
}

/// The marketplace
#[async_trait]
pub trait Marketplace: Send + Sync {
    async fn price_by_id(&self, marketplace_id: &str) -> SourceResult<PriceLookup>;

    async fn set_inventory(&self, set_num: &str) -> SourceResult<Vec<InventoryRow>>;
}
