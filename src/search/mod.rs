//! Per-gazetteer search and the aggregated search across GeoNames, WOF and
//! BTAA.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{KeyValueCache, CACHE_PREFIX};
use crate::models::{
    BtaaRegion, GeonamesRecord, WofAncestor, WofConcordance, WofDetails, WofGeoJson, WofName,
    WofPlace,
};
use crate::sources::GazetteerSource;
use crate::store::{fold_case, like_pattern, GazetteerStore};

pub const DEFAULT_LIMIT: u32 = 20;

/// Searchable gazetteers in merge order.
pub const SEARCHABLE: [GazetteerSource; 3] = [
    GazetteerSource::Geonames,
    GazetteerSource::Wof,
    GazetteerSource::Btaa,
];

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid gazetteer {0:?}: expected geonames, wof, btaa or all")]
    InvalidGazetteer(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type SearchResult<T> = Result<T, SearchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeonamesFilter {
    /// Substring of name, asciiname or alternatenames
    pub q: Option<String>,
    pub name: Option<String>,
    pub country_code: Option<String>,
    pub feature_class: Option<String>,
    pub feature_code: Option<String>,
    pub admin1_code: Option<String>,
    pub admin2_code: Option<String>,
    pub population_min: Option<i64>,
    pub population_max: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WofFilter {
    /// Substring of name
    pub q: Option<String>,
    pub name: Option<String>,
    pub placetype: Option<String>,
    pub country: Option<String>,
    pub is_current: Option<bool>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BtaaFilter {
    /// Substring of fast_area, state_name or namelsad
    pub q: Option<String>,
    pub fast_area: Option<String>,
    pub state_abbv: Option<String>,
    pub county_fips: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HitAttributes {
    Geoname(GeonamesRecord),
    Wof(WofPlace),
    Btaa(BtaaRegion),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub hit_type: String,
    /// Set on aggregated results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub attributes: HitAttributes,
}

impl From<GeonamesRecord> for SearchHit {
    fn from(record: GeonamesRecord) -> Self {
        Self {
            id: record.geonameid.to_string(),
            hit_type: "geoname".to_string(),
            source: None,
            attributes: HitAttributes::Geoname(record),
        }
    }
}

impl From<WofPlace> for SearchHit {
    fn from(place: WofPlace) -> Self {
        Self {
            id: place.wok_id.to_string(),
            hit_type: "wof".to_string(),
            source: None,
            attributes: HitAttributes::Wof(place),
        }
    }
}

impl From<BtaaRegion> for SearchHit {
    fn from(region: BtaaRegion) -> Self {
        Self {
            id: region.id.map(|id| id.to_string()).unwrap_or_default(),
            hit_type: "btaa".to_string(),
            source: None,
            attributes: HitAttributes::Btaa(region),
        }
    }
}

/// One gazetteer's page of results and the total matching its filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePage {
    pub data: Vec<SearchHit>,
    pub total_count: i64,
    pub offset: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub q: Option<String>,
    /// geonames, wof, btaa or all; absent means all
    pub gazetteer: Option<String>,
    /// Applied to GeoNames and WOF
    pub country_code: Option<String>,
    /// Applied to BTAA
    pub state_abbv: Option<String>,
    pub page: Page,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMeta {
    pub total_count: i64,
    pub offset: u32,
    pub limit: u32,
    pub source_totals: BTreeMap<String, i64>,
    pub gazetteers_searched: Vec<String>,
    pub query: SearchRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub data: Vec<SearchHit>,
    pub meta: SearchMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct GazetteerInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub info_type: String,
    pub attributes: GazetteerAttributes,
}

#[derive(Debug, Clone, Serialize)]
pub struct GazetteerAttributes {
    pub name: String,
    pub description: String,
    pub record_count: i64,
    pub website: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_tables: Option<BTreeMap<String, i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GazetteerList {
    pub data: Vec<GazetteerInfo>,
    pub meta: GazetteerListMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct GazetteerListMeta {
    pub total_gazetteers: usize,
    pub total_records: i64,
}

/// Gazetteers selected by a request's `gazetteer` value.
pub fn resolve_gazetteers(gazetteer: Option<&str>) -> SearchResult<Vec<GazetteerSource>> {
    let Some(name) = gazetteer.map(str::trim).filter(|g| !g.is_empty()) else {
        return Ok(SEARCHABLE.to_vec());
    };
    if name.eq_ignore_ascii_case("all") {
        return Ok(SEARCHABLE.to_vec());
    }
    match name.parse::<GazetteerSource>() {
        Ok(source) if SEARCHABLE.contains(&source) => Ok(vec![source]),
        _ => Err(SearchError::InvalidGazetteer(name.to_string())),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Case-insensitive substring match of `q` against a folded column.
fn push_like(qb: &mut QueryBuilder<'_, Sqlite>, folded_column: &str, q: &str) {
    qb.push(" AND ")
        .push(folded_column)
        .push(" LIKE ")
        .push_bind(like_pattern(&fold_case(q)))
        .push(" ESCAPE '\\'");
}

fn push_eq<'args, T>(qb: &mut QueryBuilder<'args, Sqlite>, column: &str, value: T)
where
    T: 'args + sqlx::Encode<'args, Sqlite> + sqlx::Type<Sqlite> + Send,
{
    qb.push(" AND ").push(column).push(" = ").push_bind(value);
}

fn geonames_predicate(qb: &mut QueryBuilder<'_, Sqlite>, filter: &GeonamesFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(q) = present(&filter.q) {
        push_like(qb, "search_folded", q);
    }
    if let Some(name) = present(&filter.name) {
        push_eq(qb, "name", name.to_string());
    }
    if let Some(cc) = present(&filter.country_code) {
        push_eq(qb, "country_code", cc.to_ascii_uppercase());
    }
    if let Some(fc) = present(&filter.feature_class) {
        push_eq(qb, "feature_class", fc.to_string());
    }
    if let Some(code) = present(&filter.feature_code) {
        push_eq(qb, "feature_code", code.to_string());
    }
    if let Some(admin1) = present(&filter.admin1_code) {
        push_eq(qb, "admin1_code", admin1.to_string());
    }
    if let Some(admin2) = present(&filter.admin2_code) {
        push_eq(qb, "admin2_code", admin2.to_string());
    }
    if let Some(min) = filter.population_min {
        qb.push(" AND population >= ").push_bind(min);
    }
    if let Some(max) = filter.population_max {
        qb.push(" AND population <= ").push_bind(max);
    }
}

fn wof_predicate(qb: &mut QueryBuilder<'_, Sqlite>, filter: &WofFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(q) = present(&filter.q) {
        push_like(qb, "name_folded", q);
    }
    if let Some(name) = present(&filter.name) {
        push_eq(qb, "name", name.to_string());
    }
    if let Some(placetype) = present(&filter.placetype) {
        push_eq(qb, "placetype", placetype.to_string());
    }
    if let Some(country) = present(&filter.country) {
        push_eq(qb, "country", country.to_ascii_uppercase());
    }
    if let Some(is_current) = filter.is_current {
        push_eq(qb, "is_current", is_current);
    }
    if let Some(parent_id) = filter.parent_id {
        push_eq(qb, "parent_id", parent_id);
    }
}

fn btaa_predicate(qb: &mut QueryBuilder<'_, Sqlite>, filter: &BtaaFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(q) = present(&filter.q) {
        push_like(qb, "search_folded", q);
    }
    if let Some(fast_area) = present(&filter.fast_area) {
        push_eq(qb, "fast_area", fast_area.to_string());
    }
    if let Some(state) = present(&filter.state_abbv) {
        push_eq(qb, "state_abbv", state.to_ascii_uppercase());
    }
    if let Some(fips) = present(&filter.county_fips) {
        push_eq(qb, "county_fips", fips.to_string());
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, page: Page) {
    qb.push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(i64::from(page.offset));
}

/// Read-side access to the gazetteer tables, with result caching.
#[derive(Clone)]
pub struct SearchEngine {
    store: GazetteerStore,
    cache: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl SearchEngine {
    pub fn new(store: GazetteerStore, cache: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    async fn cached<T, F>(&self, key: String, compute: F) -> SearchResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = SearchResult<T>>,
    {
        if let Some(hit) = self.cache.get(&key) {
            match serde_json::from_str(&hit) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("Discarding unreadable cache entry {}: {}", key, e),
            }
        }
        let value = compute.await?;
        if let Ok(json) = serde_json::to_string(&value) {
            self.cache.set(&key, json, self.ttl);
        }
        Ok(value)
    }

    fn cache_key<P: Serialize>(kind: &str, params: &P) -> String {
        format!(
            "{}search:{}:{}",
            CACHE_PREFIX,
            kind,
            serde_json::to_string(params).unwrap_or_default()
        )
    }

    async fn page<T, F>(
        &self,
        table: &str,
        order_by: &str,
        predicate: F,
        page: Page,
    ) -> SearchResult<(Vec<T>, i64)>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
        F: Fn(&mut QueryBuilder<'_, Sqlite>),
    {
        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", table));
        predicate(&mut count);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.store.pool())
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", table));
        predicate(&mut select);
        select.push(" ORDER BY ").push(order_by);
        push_page(&mut select, page);
        debug!("Search query: {}", select.sql());
        let rows = select
            .build_query_as::<T>()
            .fetch_all(self.store.pool())
            .await?;

        Ok((rows, total))
    }

    pub async fn search_geonames(
        &self,
        filter: &GeonamesFilter,
        page: Page,
    ) -> SearchResult<SourcePage> {
        let key = Self::cache_key("geonames", &(filter, page));
        self.cached(key, async {
            let (rows, total_count) = self
                .page::<GeonamesRecord, _>(
                    "gazetteer_geonames",
                    "population DESC NULLS LAST, name",
                    |qb| geonames_predicate(qb, filter),
                    page,
                )
                .await?;
            Ok(SourcePage {
                data: rows.into_iter().map(SearchHit::from).collect(),
                total_count,
                offset: page.offset,
                limit: page.limit,
            })
        })
        .await
    }

    pub async fn search_wof(&self, filter: &WofFilter, page: Page) -> SearchResult<SourcePage> {
        let key = Self::cache_key("wof", &(filter, page));
        self.cached(key, async {
            let (rows, total_count) = self
                .page::<WofPlace, _>(
                    "gazetteer_wof_spr",
                    "name, wok_id",
                    |qb| wof_predicate(qb, filter),
                    page,
                )
                .await?;
            Ok(SourcePage {
                data: rows.into_iter().map(SearchHit::from).collect(),
                total_count,
                offset: page.offset,
                limit: page.limit,
            })
        })
        .await
    }

    pub async fn search_btaa(&self, filter: &BtaaFilter, page: Page) -> SearchResult<SourcePage> {
        let key = Self::cache_key("btaa", &(filter, page));
        self.cached(key, async {
            let (rows, total_count) = self
                .page::<BtaaRegion, _>(
                    "gazetteer_btaa",
                    "state_abbv, fast_area, id",
                    |qb| btaa_predicate(qb, filter),
                    page,
                )
                .await?;
            Ok(SourcePage {
                data: rows.into_iter().map(SearchHit::from).collect(),
                total_count,
                offset: page.offset,
                limit: page.limit,
            })
        })
        .await
    }

    /// Search the selected gazetteers concurrently. Results are concatenated
    /// in GeoNames, WOF, BTAA order and cut to `limit`; `total_count` is the
    /// sum of every source's total.
    pub async fn search_gazetteers(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        let selected = resolve_gazetteers(request.gazetteer.as_deref())?;
        let key = Self::cache_key("all", request);
        self.cached(key, self.fan_out(request, selected)).await
    }

    async fn fan_out(
        &self,
        request: &SearchRequest,
        selected: Vec<GazetteerSource>,
    ) -> SearchResult<SearchResponse> {
        let page = request.page;
        let wants = |source| selected.contains(&source);

        let geonames_filter = GeonamesFilter {
            q: request.q.clone(),
            country_code: request.country_code.clone(),
            ..Default::default()
        };
        let wof_filter = WofFilter {
            q: request.q.clone(),
            country: request.country_code.clone(),
            ..Default::default()
        };
        let btaa_filter = BtaaFilter {
            q: request.q.clone(),
            state_abbv: request.state_abbv.clone(),
            ..Default::default()
        };

        let (geonames, wof, btaa) = futures::try_join!(
            async {
                match wants(GazetteerSource::Geonames) {
                    true => self.search_geonames(&geonames_filter, page).await.map(Some),
                    false => Ok(None),
                }
            },
            async {
                match wants(GazetteerSource::Wof) {
                    true => self.search_wof(&wof_filter, page).await.map(Some),
                    false => Ok(None),
                }
            },
            async {
                match wants(GazetteerSource::Btaa) {
                    true => self.search_btaa(&btaa_filter, page).await.map(Some),
                    false => Ok(None),
                }
            },
        )?;

        let mut data = Vec::new();
        let mut source_totals = BTreeMap::new();
        let mut total_count = 0;
        for (source, result) in [
            (GazetteerSource::Geonames, geonames),
            (GazetteerSource::Wof, wof),
            (GazetteerSource::Btaa, btaa),
        ] {
            let Some(result) = result else { continue };
            total_count += result.total_count;
            source_totals.insert(source.to_string(), result.total_count);
            data.extend(result.data.into_iter().map(|mut hit| {
                hit.source = Some(source.to_string());
                hit
            }));
        }
        data.truncate(page.limit as usize);

        Ok(SearchResponse {
            data,
            meta: SearchMeta {
                total_count,
                offset: page.offset,
                limit: page.limit,
                source_totals,
                gazetteers_searched: selected.iter().map(|s| s.to_string()).collect(),
                query: request.clone(),
            },
        })
    }

    async fn count(&self, table: &str) -> SearchResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.store.pool())
            .await?;
        Ok(count)
    }

    /// Every gazetteer with its record count.
    pub async fn list_gazetteers(&self) -> SearchResult<GazetteerList> {
        let geonames = self.count("gazetteer_geonames").await?;
        let wof = self.count("gazetteer_wof_spr").await?;
        let btaa = self.count("gazetteer_btaa").await?;
        let fast = self.count("gazetteer_fast").await?;

        let mut wof_tables = BTreeMap::new();
        for table in ["ancestors", "concordances", "geojson", "names"] {
            let count = self.count(&format!("gazetteer_wof_{}", table)).await?;
            wof_tables.insert(table.to_string(), count);
        }

        let info = |id: &str, name: &str, description: &str, count: i64, website: &str| {
            GazetteerInfo {
                id: id.to_string(),
                info_type: "gazetteer".to_string(),
                attributes: GazetteerAttributes {
                    name: name.to_string(),
                    description: description.to_string(),
                    record_count: count,
                    website: website.to_string(),
                    additional_tables: None,
                },
            }
        };

        let mut wof_info = info(
            "wof",
            "Who's on First",
            "Who's on First gazetteer",
            wof,
            "https://whosonfirst.org/",
        );
        wof_info.attributes.additional_tables = Some(wof_tables);

        let data = vec![
            info(
                "geonames",
                "GeoNames",
                "GeoNames geographical database",
                geonames,
                "https://www.geonames.org/",
            ),
            wof_info,
            info(
                "btaa",
                "BTAA",
                "Big Ten Academic Alliance Geoportal gazetteer",
                btaa,
                "https://geo.btaa.org/",
            ),
            info(
                "fast",
                "FAST",
                "OCLC FAST geographic headings",
                fast,
                "https://www.oclc.org/research/areas/data-science/fast.html",
            ),
        ];

        Ok(GazetteerList {
            meta: GazetteerListMeta {
                total_gazetteers: data.len(),
                total_records: geonames + wof + btaa + fast,
            },
            data,
        })
    }

    /// A WOF place with all of its child rows; `None` when absent.
    pub async fn wof_details(&self, wok_id: i64) -> SearchResult<Option<WofDetails>> {
        let pool = self.store.pool();
        let Some(spr) =
            sqlx::query_as::<_, WofPlace>("SELECT * FROM gazetteer_wof_spr WHERE wok_id = ?")
                .bind(wok_id)
                .fetch_optional(pool)
                .await?
        else {
            return Ok(None);
        };

        let ancestors = sqlx::query_as::<_, WofAncestor>(
            "SELECT * FROM gazetteer_wof_ancestors WHERE wok_id = ? ORDER BY id",
        )
        .bind(wok_id)
        .fetch_all(pool)
        .await?;
        let names = sqlx::query_as::<_, WofName>(
            "SELECT * FROM gazetteer_wof_names WHERE wok_id = ? ORDER BY id",
        )
        .bind(wok_id)
        .fetch_all(pool)
        .await?;
        let concordances = sqlx::query_as::<_, WofConcordance>(
            "SELECT * FROM gazetteer_wof_concordances WHERE wok_id = ? ORDER BY id",
        )
        .bind(wok_id)
        .fetch_all(pool)
        .await?;
        let geojson = sqlx::query_as::<_, WofGeoJson>(
            "SELECT * FROM gazetteer_wof_geojson WHERE wok_id = ? ORDER BY id",
        )
        .bind(wok_id)
        .fetch_all(pool)
        .await?;

        Ok(Some(WofDetails {
            spr,
            ancestors,
            names,
            concordances,
            geojson,
        }))
    }
}
