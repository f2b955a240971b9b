use tracing::info;

use super::GazetteerStore;

pub const GEONAMES_TABLE: &str = "gazetteer_geonames";
pub const COUNTRIES_TABLE: &str = "gazetteer_countries";
pub const WOF_SPR_TABLE: &str = "gazetteer_wof_spr";
pub const WOF_ANCESTORS_TABLE: &str = "gazetteer_wof_ancestors";
pub const WOF_CONCORDANCES_TABLE: &str = "gazetteer_wof_concordances";
pub const WOF_GEOJSON_TABLE: &str = "gazetteer_wof_geojson";
pub const WOF_NAMES_TABLE: &str = "gazetteer_wof_names";
pub const BTAA_TABLE: &str = "gazetteer_btaa";
pub const FAST_TABLE: &str = "gazetteer_fast";

impl GazetteerStore {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS gazetteer_geonames (
                geonameid INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                asciiname TEXT NOT NULL,
                alternatenames TEXT,
                latitude REAL,
                longitude REAL,
                feature_class TEXT,
                feature_code TEXT,
                country_code TEXT,
                cc2 TEXT,
                admin1_code TEXT,
                admin2_code TEXT,
                admin3_code TEXT,
                admin4_code TEXT,
                population INTEGER,
                elevation INTEGER,
                dem INTEGER,
                timezone TEXT,
                modification_date TEXT,
                name_folded TEXT NOT NULL,
                search_folded TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_geonames_name ON gazetteer_geonames (name);
            CREATE INDEX IF NOT EXISTS idx_geonames_classification
                ON gazetteer_geonames (country_code, feature_class, feature_code);
            CREATE INDEX IF NOT EXISTS idx_geonames_admin ON gazetteer_geonames (admin1_code, admin2_code);
            CREATE INDEX IF NOT EXISTS idx_geonames_population ON gazetteer_geonames (population);

            CREATE TABLE IF NOT EXISTS gazetteer_countries (
                iso_alpha2 TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS gazetteer_wof_spr (
                wok_id INTEGER PRIMARY KEY,
                parent_id INTEGER,
                name TEXT NOT NULL,
                placetype TEXT,
                country TEXT,
                repo TEXT,
                latitude REAL,
                longitude REAL,
                min_latitude REAL,
                min_longitude REAL,
                max_latitude REAL,
                max_longitude REAL,
                is_current BOOLEAN,
                is_deprecated BOOLEAN,
                is_ceased BOOLEAN,
                is_superseded BOOLEAN,
                is_superseding BOOLEAN,
                superseded_by INTEGER,
                supersedes INTEGER,
                lastmodified INTEGER,
                name_folded TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wof_spr_name ON gazetteer_wof_spr (name);
            CREATE INDEX IF NOT EXISTS idx_wof_spr_placetype ON gazetteer_wof_spr (placetype);
            CREATE INDEX IF NOT EXISTS idx_wof_spr_country ON gazetteer_wof_spr (country);
            CREATE INDEX IF NOT EXISTS idx_wof_spr_parent ON gazetteer_wof_spr (parent_id);

            CREATE TABLE IF NOT EXISTS gazetteer_wof_ancestors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wok_id INTEGER NOT NULL,
                ancestor_id INTEGER NOT NULL,
                ancestor_placetype TEXT,
                lastmodified INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wof_ancestors_wok_id ON gazetteer_wof_ancestors (wok_id);

            CREATE TABLE IF NOT EXISTS gazetteer_wof_concordances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wok_id INTEGER NOT NULL,
                other_id TEXT NOT NULL,
                other_source TEXT,
                lastmodified INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wof_concordances_wok_id ON gazetteer_wof_concordances (wok_id);

            CREATE TABLE IF NOT EXISTS gazetteer_wof_geojson (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wok_id INTEGER NOT NULL,
                body TEXT NOT NULL,
                source TEXT,
                alt_label TEXT,
                is_alt BOOLEAN,
                lastmodified INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wof_geojson_wok_id ON gazetteer_wof_geojson (wok_id);

            CREATE TABLE IF NOT EXISTS gazetteer_wof_names (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wok_id INTEGER NOT NULL,
                placetype TEXT,
                country TEXT,
                language TEXT,
                extlang TEXT,
                script TEXT,
                region TEXT,
                variant TEXT,
                extension TEXT,
                privateuse TEXT,
                name TEXT NOT NULL,
                lastmodified INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wof_names_wok_id ON gazetteer_wof_names (wok_id);

            CREATE TABLE IF NOT EXISTS gazetteer_btaa (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fast_area TEXT NOT NULL,
                bounding_box TEXT,
                geometry TEXT,
                geonames_id TEXT,
                state_abbv TEXT,
                state_name TEXT,
                county_fips TEXT,
                statefp TEXT,
                namelsad TEXT,
                search_folded TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_btaa_fast_area ON gazetteer_btaa (fast_area);
            CREATE INDEX IF NOT EXISTS idx_btaa_state_abbv ON gazetteer_btaa (state_abbv);
            CREATE INDEX IF NOT EXISTS idx_btaa_county_fips ON gazetteer_btaa (county_fips);

            CREATE TABLE IF NOT EXISTS gazetteer_fast (
                fast_id TEXT PRIMARY KEY,
                uri TEXT NOT NULL,
                type TEXT NOT NULL,
                label TEXT NOT NULL,
                geoname_id TEXT,
                viaf_id TEXT,
                wikipedia_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fast_label ON gazetteer_fast (label);
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!("Gazetteer schema ready");
        Ok(())
    }
}
