//! Minifig metadata

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::part::INVALID_PART_NAME;

/// Catalog attributes for a minifig, keyed by catalog id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinifigMetadata {
    pub minifig_id_rebrickable: String,
    pub minifig_name: String,
    pub minifig_image: String,
    /// Resolved marketplace id; kept forever once found
    pub minifig_id_bricklink: Option<String>,
    /// Confirmed non-existent upstream; never fetched again
    #[serde(default)]
    pub invalid: bool,
    /// Soft expiry for name/image
    pub expires_at: DateTime<Utc>,
}

impl MinifigMetadata {
    /// Terminal entry for an id the catalog does not know
    pub fn invalid(minifig_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            minifig_id_rebrickable: minifig_id.into(),
            minifig_name: INVALID_PART_NAME.to_string(),
            minifig_image: String::new(),
            minifig_id_bricklink: None,
            invalid: true,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Reference handed to the price service
///
/// Callers that already know the name or marketplace id pass them along to
/// save a catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MinifigRef {
    pub minifig_id_rebrickable: String,
    #[serde(default)]
    pub minifig_name: Option<String>,
    #[serde(default)]
    pub minifig_id_bricklink: Option<String>,
}

impl MinifigRef {
    pub fn new(minifig_id_rebrickable: impl Into<String>) -> Self {
        Self {
            minifig_id_rebrickable: minifig_id_rebrickable.into(),
            minifig_name: None,
            minifig_id_bricklink: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_minifig_sentinel() {
        let fig = MinifigMetadata::invalid("fig-999999", Duration::days(30));
        assert!(fig.invalid);
        assert_eq!(fig.minifig_name, INVALID_PART_NAME);
        assert!(fig.minifig_image.is_empty());
        assert!(!fig.is_stale_at(Utc::now()));
    }

    #[test]
    fn test_invalid_flag_defaults_when_absent() {
        let json = r#"{"minifig_id_rebrickable":"fig-1","minifig_name":"Luke","minifig_image":"",
            "minifig_id_bricklink":null,"expires_at":"2030-01-01T00:00:00Z"}"#;
        let fig: MinifigMetadata = serde_json::from_str(json).unwrap();
        assert!(!fig.invalid);
    }
}
