//! SQLite-backed gazetteer store.

pub mod bulk;
pub mod schema;
pub mod tables;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub use bulk::{GazetteerTable, LoadOptions, LoadStats, TableLoader};
pub use schema::*;

/// Connection pool plus schema bootstrap. Cheap to clone.
#[derive(Clone)]
pub struct GazetteerStore {
    pool: SqlitePool,
}

impl GazetteerStore {
    /// Open (creating if needed) the database at `database_url` and ensure
    /// every gazetteer table exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Opening gazetteer database {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {}", database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// data alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store
            .initialize_schema()
            .await
            .context("Failed to initialize schema")?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn table_count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", table))?;
        Ok(count)
    }

    /// Row counts for every gazetteer table.
    pub async fn table_counts(&self) -> Result<BTreeMap<&'static str, i64>> {
        let mut counts = BTreeMap::new();
        for table in [
            GEONAMES_TABLE,
            COUNTRIES_TABLE,
            WOF_SPR_TABLE,
            WOF_ANCESTORS_TABLE,
            WOF_CONCORDANCES_TABLE,
            WOF_GEOJSON_TABLE,
            WOF_NAMES_TABLE,
            BTAA_TABLE,
            FAST_TABLE,
        ] {
            counts.insert(table, self.table_count(table).await?);
        }
        Ok(counts)
    }

    /// Display name for an ISO alpha-2 code, if the country table has it.
    pub async fn country_name(&self, iso_alpha2: &str) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT name FROM gazetteer_countries WHERE iso_alpha2 = ?",
        )
        .bind(iso_alpha2.to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up country name")?;
        Ok(name)
    }
}

/// Separates the fields of a search key so a pattern cannot match across two.
const KEY_SEPARATOR: char = '\u{1f}';

/// Unicode lowercase form stored in the `*_folded` columns. SQLite's own
/// LIKE only folds ASCII, so both sides of a match go through this.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Folded concatenation of the present fields.
pub fn search_key<'a>(fields: impl IntoIterator<Item = Option<&'a str>>) -> String {
    let mut key = String::new();
    for field in fields.into_iter().flatten() {
        if !key.is_empty() {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(&fold_case(field));
    }
    key
}

/// `%q%` with LIKE wildcards in `q` escaped; pair with `ESCAPE '\'`.
pub fn like_pattern(q: &str) -> String {
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Minn"), "%Minn%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn test_search_key_folds_unicode() {
        assert_eq!(fold_case("Île-de-France"), "île-de-france");
        assert_eq!(
            search_key([Some("ÅLAND"), None, Some("Ahvenanmaa")]),
            "åland\u{1f}ahvenanmaa"
        );
        assert_eq!(search_key([None, None]), "");
    }

    #[tokio::test]
    async fn test_schema_creates_every_table() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let counts = store.table_counts().await.unwrap();
        assert_eq!(counts.len(), 9);
        assert!(counts.values().all(|&c| c == 0));
    }

    #[tokio::test]
    async fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("gazetteer.db").display());

        let store = GazetteerStore::connect(&url).await.unwrap();
        assert_eq!(store.table_count(GEONAMES_TABLE).await.unwrap(), 0);
        store.close().await;

        assert!(dir.path().join("gazetteer.db").exists());
    }

    #[tokio::test]
    async fn test_country_name_is_case_insensitive() {
        let store = GazetteerStore::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO gazetteer_countries VALUES ('US', 'United States', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        assert_eq!(
            store.country_name("us").await.unwrap().as_deref(),
            Some("United States")
        );
        assert_eq!(store.country_name("FR").await.unwrap(), None);
    }
}
