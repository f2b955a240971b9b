//! Free-text place resolution against GeoNames.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{KeyValueCache, CACHE_PREFIX};
use crate::models::{GeonamesRecord, LookupResult};
use crate::store::{fold_case, like_pattern, GazetteerStore};

/// Population at which the population bonus reaches its cap.
const POPULATION_SCALE: f64 = 10_000_000.0;

/// Entity type to GeoNames feature class.
/// See: https://www.geonames.org/export/codes.html
pub fn feature_class_for(entity_type: &str) -> Option<&'static str> {
    match entity_type.trim().to_ascii_lowercase().as_str() {
        "country" | "state" | "province" => Some("A"),
        "city" | "town" | "village" => Some("P"),
        "river" | "lake" | "ocean" | "sea" => Some("H"),
        "mountain" | "hill" | "valley" => Some("T"),
        "forest" => Some("V"),
        "park" | "island" | "peninsula" => Some("L"),
        _ => None,
    }
}

/// Human readable category for a feature class and code.
pub fn entity_type_for(feature_class: Option<&str>, feature_code: Option<&str>) -> &'static str {
    let Some(class) = feature_class else {
        return "unknown";
    };

    match (class, feature_code.unwrap_or_default()) {
        ("P", "PPL") => "city",
        ("P", "PPLA") => "capital",
        ("P", "PPLG") => "seat of government",
        ("H", "STM") => "stream",
        ("H", "RV") => "river",
        ("H", "LK") => "lake",
        ("H", "OCN") => "ocean",
        ("H", "SEA") => "sea",
        ("A", _) => "administrative",
        ("H", _) => "hydrographic",
        ("L", _) => "area",
        ("P", _) => "populated place",
        ("R", _) => "road",
        ("S", _) => "spot",
        ("T", _) => "hypsographic",
        ("U", _) => "undersea",
        ("V", _) => "vegetation",
        _ => "unknown",
    }
}

/// Whether a derived type satisfies the requested entity type. Capitals
/// and seats of government are cities; streams are rivers.
pub fn type_matches(derived: &str, requested: &str) -> bool {
    let requested = requested.trim().to_ascii_lowercase();
    if derived == requested {
        return true;
    }
    match requested.as_str() {
        "city" => matches!(derived, "capital" | "seat of government"),
        "river" => derived == "stream",
        _ => false,
    }
}

/// Match quality in [0, 1].
pub fn confidence(record: &GeonamesRecord, query: &str, entity_type: Option<&str>) -> f64 {
    let mut score = 0.5;

    if record.name.to_lowercase() == query.to_lowercase() {
        score += 0.3;
    } else if record.asciiname.to_lowercase() == query.to_lowercase() {
        score += 0.2;
    }

    if let Some(requested) = entity_type {
        let derived = entity_type_for(
            record.feature_class.as_deref(),
            record.feature_code.as_deref(),
        );
        if type_matches(derived, requested) {
            score += 0.2;
        }
    }

    if let Some(population) = record.population.filter(|p| *p > 0) {
        score += (population as f64 / POPULATION_SCALE * 0.1).min(0.1);
    }

    score.min(1.0)
}

pub struct GazetteerService {
    store: GazetteerStore,
    cache: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl GazetteerService {
    pub fn new(store: GazetteerStore, cache: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Best GeoNames match for `name`: the most populous place whose name
    /// contains it, optionally restricted to the feature class of
    /// `entity_type`. `context` is logged only.
    pub async fn lookup_place(
        &self,
        name: &str,
        entity_type: Option<&str>,
        context: Option<&str>,
    ) -> Result<Option<LookupResult>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if let Some(context) = context {
            debug!("Lookup context for {:?}: {}", name, context);
        }

        let key = format!(
            "{}lookup:{}:{}",
            CACHE_PREFIX,
            name.to_lowercase(),
            entity_type.unwrap_or_default().to_lowercase()
        );
        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_str::<LookupResult>(&cached) {
                Ok(result) => return Ok(Some(result)),
                Err(e) => warn!("Discarding unreadable cache entry {}: {}", key, e),
            }
        }

        let feature_class = entity_type.and_then(feature_class_for);
        let Some(record) = self.best_match(name, feature_class).await? else {
            info!("No place found for {:?}", name);
            return Ok(None);
        };

        let country = match record.country_code.as_deref() {
            Some(code) => self.store.country_name(code).await.unwrap_or_else(|e| {
                warn!("Country name lookup failed for {}: {:#}", code, e);
                None
            }),
            None => None,
        };

        let result = LookupResult {
            confidence: confidence(&record, name, entity_type),
            place_type: entity_type_for(
                record.feature_class.as_deref(),
                record.feature_code.as_deref(),
            )
            .to_string(),
            country,
            record,
        };
        info!(
            "Found place {} ({}) confidence {:.2}",
            result.record.name, result.record.geonameid, result.confidence
        );

        if let Ok(json) = serde_json::to_string(&result) {
            self.cache.set(&key, json, self.ttl);
        }
        Ok(Some(result))
    }

    async fn best_match(
        &self,
        name: &str,
        feature_class: Option<&str>,
    ) -> Result<Option<GeonamesRecord>> {
        let mut sql = String::from(
            "SELECT * FROM gazetteer_geonames WHERE name_folded LIKE ? ESCAPE '\\'",
        );
        if feature_class.is_some() {
            sql.push_str(" AND feature_class = ?");
        }
        sql.push_str(" ORDER BY population DESC NULLS LAST, geonameid LIMIT 1");
        debug!("Lookup query: {} [{:?}, {:?}]", sql, name, feature_class);

        let mut query =
            sqlx::query_as::<_, GeonamesRecord>(&sql).bind(like_pattern(&fold_case(name)));
        if let Some(class) = feature_class {
            query = query.bind(class);
        }

        query
            .fetch_optional(self.store.pool())
            .await
            .with_context(|| format!("Failed to look up place {:?}", name))
    }
}
