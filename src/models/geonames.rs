//! GeoNames records (`gazetteer_geonames`) and country display names.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row of the GeoNames dump.
/// See: https://download.geonames.org/export/dump/readme.txt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GeonamesRecord {
    /// Stable GeoNames identifier
    pub geonameid: i64,
    pub name: String,
    pub asciiname: String,
    /// Comma separated alternate names, kept as free text
    pub alternatenames: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Single letter category (A, H, L, P, R, S, T, U, V)
    pub feature_class: Option<String>,
    pub feature_code: Option<String>,
    pub country_code: Option<String>,
    pub cc2: Option<String>,
    pub admin1_code: Option<String>,
    pub admin2_code: Option<String>,
    pub admin3_code: Option<String>,
    pub admin4_code: Option<String>,
    pub population: Option<i64>,
    pub elevation: Option<i64>,
    /// Digital elevation model value
    pub dem: Option<i64>,
    pub timezone: Option<String>,
    pub modification_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// ISO country code to display name (`gazetteer_countries`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Country {
    pub iso_alpha2: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
