use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// BTAA geoportal region (`gazetteer_btaa`).
///
/// `fast_area` is a display name and is not unique across rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BtaaRegion {
    /// Row id assigned by the store; `None` before insertion
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub fast_area: String,
    pub bounding_box: Option<String>,
    pub geometry: Option<String>,
    /// Soft reference into GeoNames, not enforced
    pub geonames_id: Option<String>,
    pub state_abbv: Option<String>,
    pub state_name: Option<String>,
    pub county_fips: Option<String>,
    pub statefp: Option<String>,
    pub namelsad: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
