//! HTTP API handlers for brickvault-meta
//!
//! Thin layer over [`crate::services::EnrichmentService`].

pub mod enrich;
pub mod health;
pub mod minifigs;
pub mod parts;
pub mod records;
pub mod sse;

pub use enrich::enrich_routes;
pub use health::health_routes;
pub use minifigs::minifig_routes;
pub use parts::part_routes;
pub use records::record_routes;
pub use sse::event_stream;
