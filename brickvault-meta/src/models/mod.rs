//! Data models for the metadata cache layer

pub mod batch;
pub mod minifig;
pub mod part;
pub mod price;
pub mod record;

pub use batch::{
    BatchPhase, BatchReport, BatchRunStatus, EnrichAccepted, FetchOutcome, RunReport, RunState,
};
pub use minifig::{MinifigMetadata, MinifigRef};
pub use part::{ColorEntry, PartMetadata, INVALID_PART_NAME};
pub use price::{
    compute_trend, PriceData, PriceHistoryEntry, PriceSnapshot, PriceTrends, PriceWithTrend, Trend,
    TrendDirection,
};
pub use record::{EnrichedRecord, NewRecord, RecordKind, UserOwnedRecord};
