//! Price snapshots, history rows and trend computation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace price guide for one minifig
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    pub new_min: Option<f64>,
    pub new_max: Option<f64>,
    pub new_avg: Option<f64>,
    pub used_min: Option<f64>,
    pub used_max: Option<f64>,
    pub used_avg: Option<f64>,
    pub currency_code: String,
    pub currency_symbol: String,
}

impl PriceData {
    /// Build from min/max pairs; averages are `round((min + max) / 2, 2)`
    pub fn from_ranges(
        new_min: Option<f64>,
        new_max: Option<f64>,
        used_min: Option<f64>,
        used_max: Option<f64>,
        currency_code: impl Into<String>,
        currency_symbol: impl Into<String>,
    ) -> Self {
        Self {
            new_min,
            new_max,
            new_avg: average(new_min, new_max),
            used_min,
            used_max,
            used_avg: average(used_min, used_max),
            currency_code: currency_code.into(),
            currency_symbol: currency_symbol.into(),
        }
    }

    /// Fallback returned when no price could be obtained
    pub fn zeroed() -> Self {
        Self {
            new_min: Some(0.0),
            new_max: Some(0.0),
            new_avg: Some(0.0),
            used_min: Some(0.0),
            used_max: Some(0.0),
            used_avg: Some(0.0),
            currency_code: "USD".to_string(),
            currency_symbol: "$".to_string(),
        }
    }
}

fn average(min: Option<f64>, max: Option<f64>) -> Option<f64> {
    match (min, max) {
        (Some(min), Some(max)) => Some(round_to((min + max) / 2.0, 2)),
        _ => None,
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// The live price row for a minifig
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub minifig_id_rebrickable: String,
    pub price_data: PriceData,
    pub is_expired: bool,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Live and within its expiry window
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired && self.expires_at > now
    }
}

/// Archived snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub id: i64,
    pub minifig_id_rebrickable: String,
    pub price_data: PriceData,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Absolute change in percent, one decimal
    pub percentage: f64,
}

impl Trend {
    pub fn none() -> Self {
        Self {
            direction: TrendDirection::None,
            percentage: 0.0,
        }
    }
}

impl Default for Trend {
    fn default() -> Self {
        Self::none()
    }
}

/// Trend of `current` relative to `previous`
///
/// `none` when either side is missing, when they are equal, or when the
/// previous value is zero.
pub fn compute_trend(current: Option<f64>, previous: Option<f64>) -> Trend {
    let (Some(current), Some(previous)) = (current, previous) else {
        return Trend::none();
    };

    if previous == 0.0 || current == previous || !current.is_finite() || !previous.is_finite() {
        return Trend::none();
    }

    let change = round_to(100.0 * (current - previous) / previous, 1);
    if change == 0.0 {
        return Trend::none();
    }

    Trend {
        direction: if change > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        },
        percentage: change.abs(),
    }
}

/// Per-field trends
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceTrends {
    pub new_min: Trend,
    pub new_max: Trend,
    pub new_avg: Trend,
    pub used_min: Trend,
    pub used_max: Trend,
    pub used_avg: Trend,
}

impl PriceTrends {
    pub fn between(current: &PriceData, previous: &PriceData) -> Self {
        Self {
            new_min: compute_trend(current.new_min, previous.new_min),
            new_max: compute_trend(current.new_max, previous.new_max),
            new_avg: compute_trend(current.new_avg, previous.new_avg),
            used_min: compute_trend(current.used_min, previous.used_min),
            used_max: compute_trend(current.used_max, previous.used_max),
            used_avg: compute_trend(current.used_avg, previous.used_avg),
        }
    }
}

/// Result of `get_minifig_price_with_trend`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWithTrend {
    pub minifig_id_rebrickable: String,
    pub minifig_id_bricklink: Option<String>,
    pub price: PriceData,
    pub trends: PriceTrends,
    pub fetched_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}
