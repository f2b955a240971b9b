//! Who's On First tables: the `spr` summary plus its child tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard place response row (`gazetteer_wof_spr`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WofPlace {
    pub wok_id: i64,
    /// Parent place; forms the WOF hierarchy
    pub parent_id: Option<i64>,
    pub name: String,
    pub placetype: Option<String>,
    pub country: Option<String>,
    pub repo: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub min_latitude: Option<f64>,
    pub min_longitude: Option<f64>,
    pub max_latitude: Option<f64>,
    pub max_longitude: Option<f64>,
    pub is_current: Option<bool>,
    pub is_deprecated: Option<bool>,
    pub is_ceased: Option<bool>,
    pub is_superseded: Option<bool>,
    pub is_superseding: Option<bool>,
    pub superseded_by: Option<i64>,
    pub supersedes: Option<i64>,
    pub lastmodified: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WofAncestor {
    pub wok_id: i64,
    pub ancestor_id: i64,
    pub ancestor_placetype: Option<String>,
    pub lastmodified: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cross reference to an identifier in another system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WofConcordance {
    pub wok_id: i64,
    pub other_id: String,
    pub other_source: Option<String>,
    pub lastmodified: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WofGeoJson {
    pub wok_id: i64,
    /// Raw GeoJSON feature
    pub body: String,
    pub source: Option<String>,
    pub alt_label: Option<String>,
    pub is_alt: Option<bool>,
    pub lastmodified: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Localized name keyed by BCP-47 style language/script/region parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WofName {
    pub wok_id: i64,
    pub placetype: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub extlang: Option<String>,
    pub script: Option<String>,
    pub region: Option<String>,
    pub variant: Option<String>,
    pub extension: Option<String>,
    pub privateuse: Option<String>,
    pub name: String,
    pub lastmodified: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A place with every child row attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WofDetails {
    pub spr: WofPlace,
    pub ancestors: Vec<WofAncestor>,
    pub names: Vec<WofName>,
    pub concordances: Vec<WofConcordance>,
    pub geojson: Vec<WofGeoJson>,
}
