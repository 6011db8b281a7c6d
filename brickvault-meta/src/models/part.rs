//! Part metadata (shared across all owners and tables)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Display name stored for ids the catalog confirmed missing
pub const INVALID_PART_NAME: &str = "Invalid/Missing ID";

/// One color a part is available in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorEntry {
    #[serde(default)]
    pub color_id: String,
    #[serde(default)]
    pub color_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Sentinel entry stored for invalid parts
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty: bool,
}

impl ColorEntry {
    pub fn new(color_id: impl Into<String>, color_name: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            color_id: color_id.into(),
            color_name: color_name.into(),
            image_url,
            empty: false,
        }
    }

    /// Placeholder color recorded alongside an invalid id
    pub fn empty() -> Self {
        Self {
            color_id: String::new(),
            color_name: String::new(),
            image_url: None,
            empty: true,
        }
    }
}

/// Enriched attributes for an element id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartMetadata {
    pub element_id: String,
    pub element_name: String,
    /// Confirmed non-existent upstream; never fetched again
    pub invalid: bool,
    /// Stored with partial data; a later pass should fill it in
    pub cache_incomplete: bool,
    pub available_colors: Vec<ColorEntry>,
    /// Soft expiry: past-due entries are eligible for refresh, never deleted
    pub expires_at: DateTime<Utc>,
}

impl PartMetadata {
    /// Complete entry with the colors the catalog returned
    ///
    /// Duplicate color ids keep their first occurrence.
    pub fn with_colors(
        element_id: impl Into<String>,
        element_name: impl Into<String>,
        colors: Vec<ColorEntry>,
        ttl: Duration,
    ) -> Self {
        let mut available_colors: Vec<ColorEntry> = Vec::with_capacity(colors.len());
        for color in colors {
            if !available_colors.iter().any(|c| c.color_id == color.color_id) {
                available_colors.push(color);
            }
        }

        Self {
            element_id: element_id.into(),
            element_name: element_name.into(),
            invalid: false,
            cache_incomplete: available_colors.is_empty(),
            available_colors,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Valid id with no color data yet
    pub fn incomplete(element_id: impl Into<String>, element_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            element_id: element_id.into(),
            element_name: element_name.into(),
            invalid: false,
            cache_incomplete: true,
            available_colors: Vec::new(),
            expires_at: Utc::now() + ttl,
        }
    }

    /// Terminal entry for an id the catalog does not know
    pub fn invalid(element_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            element_id: element_id.into(),
            element_name: INVALID_PART_NAME.to_string(),
            invalid: true,
            cache_incomplete: false,
            available_colors: vec![ColorEntry::empty()],
            expires_at: Utc::now() + ttl,
        }
    }

    /// Whether this entry satisfies a lookup without going upstream
    ///
    /// Invalid entries are terminal hits. Incomplete entries are misses so a
    /// later pass can fill in the colors.
    pub fn is_cache_hit(&self) -> bool {
        self.invalid || !self.cache_incomplete
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
