use serde::{Deserialize, Serialize};

use super::GeonamesRecord;

/// Best GeoNames match for a free-text place name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    #[serde(flatten)]
    pub record: GeonamesRecord,
    /// Match quality in [0, 1]
    pub confidence: f64,
    /// Country display name when known
    pub country: Option<String>,
    /// Human readable category, e.g. "city" or "administrative"
    #[serde(rename = "type")]
    pub place_type: String,
}
