//! Services for the metadata cache layer
//!
//! Leaf-first: rate limiter and retry wrapper, upstream clients behind the
//! [`sources`] traits, the cache manager and fetchers, the batch
//! orchestrator, the price service and the read path.

pub mod batch_orchestrator;
pub mod batch_registry;
pub mod bricklink_client;
pub mod cache_manager;
pub mod enrichers;
pub mod enrichment;
pub mod http_retry;
pub mod inflight;
pub mod inventory_parser;
pub mod marketplace_resolver;
pub mod minifig_fetcher;
pub mod name_matcher;
pub mod part_fetcher;
pub mod price_service;
pub mod rate_limiter;
pub mod read_path;
pub mod rebrickable_client;
pub mod sources;

pub use batch_orchestrator::{plan_batches, BatchConfig, BatchEnricher, BatchOrchestrator};
pub use batch_registry::BatchRegistry;
pub use bricklink_client::BrickLinkClient;
pub use cache_manager::MetadataCache;
pub use enrichers::{MinifigEnricher, PartEnricher, PriceEnricher};
pub use enrichment::{EnrichError, EnrichmentService, EnrichmentTuning};
pub use http_retry::{fetch_with_retry, FetchError, RetryOptions};
pub use inflight::InFlight;
pub use marketplace_resolver::MarketplaceResolver;
pub use minifig_fetcher::MinifigFetcher;
pub use name_matcher::{best_match, normalize_name, JaroWinklerScorer, LevenshteinScorer, NameScorer};
pub use part_fetcher::PartFetcher;
pub use price_service::{PriceRefresh, PriceService};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use rebrickable_client::RebrickableClient;
pub use sources::{
    InventoryRow, Marketplace, MinifigDetails, PartColors, PartsCatalog, PriceLookup, SetSummary, SourceError,
    SourceResult,
};
