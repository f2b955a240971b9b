//! Who's On First importer: five tables, each read from `<wof>/<table>/`.
//!
//! Files are read positionally. The exported CSVs carry WOF's own header
//! (`id,...`), which is recognized and dropped.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    load_files, parse_flag, BaseImporter, ImportIssue, ImportResult, ImportStatus, RawRecord,
    MAX_ISSUES,
};
use crate::models::{WofAncestor, WofConcordance, WofGeoJson, WofName, WofPlace};
use crate::store::{GazetteerStore, GazetteerTable, LoadOptions};

pub const SPR_FIELDS: &[&str] = &[
    "wok_id",
    "parent_id",
    "name",
    "placetype",
    "country",
    "repo",
    "latitude",
    "longitude",
    "min_latitude",
    "min_longitude",
    "max_latitude",
    "max_longitude",
    "is_current",
    "is_deprecated",
    "is_ceased",
    "is_superseded",
    "is_superseding",
    "superseded_by",
    "supersedes",
    "lastmodified",
];
pub const ANCESTORS_FIELDS: &[&str] = &["wok_id", "ancestor_id", "ancestor_placetype", "lastmodified"];
pub const CONCORDANCES_FIELDS: &[&str] = &["wok_id", "other_id", "other_source", "lastmodified"];
pub const GEOJSON_FIELDS: &[&str] = &["wok_id", "body", "source", "alt_label", "is_alt", "lastmodified"];
pub const NAMES_FIELDS: &[&str] = &[
    "wok_id",
    "placetype",
    "country",
    "language",
    "extlang",
    "script",
    "region",
    "variant",
    "extension",
    "privateuse",
    "name",
    "lastmodified",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WofTable {
    Spr,
    Ancestors,
    Concordances,
    Geojson,
    Names,
}

impl WofTable {
    pub const ALL: [WofTable; 5] = [
        WofTable::Spr,
        WofTable::Ancestors,
        WofTable::Concordances,
        WofTable::Geojson,
        WofTable::Names,
    ];

    /// Name of the WOF table, and of its directory under the data dir.
    pub fn as_str(&self) -> &'static str {
        match self {
            WofTable::Spr => "spr",
            WofTable::Ancestors => "ancestors",
            WofTable::Concordances => "concordances",
            WofTable::Geojson => "geojson",
            WofTable::Names => "names",
        }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            WofTable::Spr => SPR_FIELDS,
            WofTable::Ancestors => ANCESTORS_FIELDS,
            WofTable::Concordances => CONCORDANCES_FIELDS,
            WofTable::Geojson => GEOJSON_FIELDS,
            WofTable::Names => NAMES_FIELDS,
        }
    }
}

pub struct WofImporter {
    store: GazetteerStore,
    data_dir: PathBuf,
    options: LoadOptions,
}

impl WofImporter {
    pub fn new(store: GazetteerStore, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            data_dir: data_dir.into(),
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Import one table. A missing or empty table directory is a warning.
    pub async fn import_table(&self, table: WofTable) -> ImportResult {
        let dir = self.data_dir.join(table.as_str());
        let mut base = BaseImporter::new(self.store.clone(), &dir);

        let files = base.find_files("csv");
        if files.is_empty() {
            let message = format!("No CSV files for {} in {}", table.as_str(), dir.display());
            tracing::warn!("{}", message);
            return base.result_with(ImportStatus::Warning, Some(message));
        }

        let fields = table.fields();
        let options = self.options;
        let loaded = match table {
            WofTable::Spr => load(&mut base, &files, fields, options, clean_spr).await,
            WofTable::Ancestors => load(&mut base, &files, fields, options, clean_ancestor).await,
            WofTable::Concordances => {
                load(&mut base, &files, fields, options, clean_concordance).await
            }
            WofTable::Geojson => load(&mut base, &files, fields, options, clean_geojson).await,
            WofTable::Names => load(&mut base, &files, fields, options, clean_name).await,
        };

        match loaded {
            Ok(()) => base.result(),
            Err(e) => base.fail(e),
        }
    }

    pub async fn import_data(self) -> ImportResult {
        let started = Instant::now();
        if !self.data_dir.exists() {
            let message = format!("WOF data directory not found: {}", self.data_dir.display());
            return aggregate(started, BTreeMap::new(), ImportStatus::Error, Some(message));
        }

        let mut tables = BTreeMap::new();
        let mut aborted = None;
        for table in WofTable::ALL {
            info!("Importing WOF table {}", table.as_str());
            let result = self.import_table(table).await;
            let failed = result.status == ImportStatus::Error;
            tables.insert(table.as_str().to_string(), result);
            if failed {
                aborted = Some(format!("WOF table {} failed", table.as_str()));
                break;
            }
        }

        if let Some(message) = aborted {
            return aggregate(started, tables, ImportStatus::Error, Some(message));
        }
        if tables.values().all(|r| r.status == ImportStatus::Warning) {
            let message = format!("No WOF CSV files found in {}", self.data_dir.display());
            return aggregate(started, tables, ImportStatus::Error, Some(message));
        }

        let status = if tables.values().any(|r| r.error_count() > 0) {
            ImportStatus::PartialSuccess
        } else {
            ImportStatus::Success
        };
        let result = aggregate(started, tables, status, None);
        info!(
            "WOF import completed: {} records across {} file(s) in {:.2}s",
            result.records_processed, result.files_processed, result.elapsed_time
        );
        result
    }
}

async fn load<T, F>(
    base: &mut BaseImporter,
    files: &[PathBuf],
    fields: &[&str],
    options: LoadOptions,
    clean: F,
) -> Result<()>
where
    T: GazetteerTable,
    F: FnMut(&mut BaseImporter, &RawRecord) -> Option<T>,
{
    load_files(base, files, b',', Some(fields), options, clean).await?;
    Ok(())
}

/// Sum the per-table results into one source result.
fn aggregate(
    started: Instant,
    tables: BTreeMap<String, ImportResult>,
    status: ImportStatus,
    message: Option<String>,
) -> ImportResult {
    let mut errors: Vec<ImportIssue> = Vec::new();
    let mut errors_suppressed = 0;
    for result in tables.values() {
        for issue in &result.errors {
            if errors.len() < MAX_ISSUES {
                errors.push(issue.clone());
            } else {
                errors_suppressed += 1;
            }
        }
        errors_suppressed += result.errors_suppressed;
    }

    let records_processed: usize = tables.values().map(|r| r.records_processed).sum();
    let elapsed_time = started.elapsed().as_secs_f64();
    ImportResult {
        status,
        files_processed: tables.values().map(|r| r.files_processed).sum(),
        records_processed,
        records_skipped: tables.values().map(|r| r.records_skipped).sum(),
        errors,
        errors_suppressed,
        elapsed_time,
        records_per_second: if elapsed_time > 0.0 {
            records_processed as f64 / elapsed_time
        } else {
            0.0
        },
        message,
        tables: Some(tables),
    }
}

/// `wok_id` of a row, or `None` for header rows and unusable ids.
fn wok_id(base: &mut BaseImporter, record: &RawRecord) -> Option<i64> {
    match record.get("wok_id") {
        Some("id") | Some("wok_id") => {
            debug!("Skipping header row");
            None
        }
        Some(_) => {
            let id = base.int(record, "wok_id");
            if id.is_none() {
                base.skip(record, "invalid wok_id");
            }
            id
        }
        None => {
            base.skip(record, "missing wok_id");
            None
        }
    }
}

fn text(record: &RawRecord, field: &str) -> Option<String> {
    record.get(field).map(str::to_string)
}

fn flag(record: &RawRecord, field: &str) -> Option<bool> {
    record.get(field).map(parse_flag)
}

pub(crate) fn clean_spr(base: &mut BaseImporter, record: &RawRecord) -> Option<WofPlace> {
    let wok_id = wok_id(base, record)?;
    let placetype = text(record, "placetype");
    let name = text(record, "name").unwrap_or_else(|| {
        let name = format!(
            "Unnamed {} #{}",
            placetype.as_deref().unwrap_or("place"),
            wok_id
        );
        debug!("Record without name, using {}", name);
        name
    });

    let now = base.now();
    Some(WofPlace {
        wok_id,
        parent_id: base.int(record, "parent_id"),
        name,
        placetype,
        country: text(record, "country").map(|c| c.to_ascii_uppercase()),
        repo: text(record, "repo"),
        latitude: base.float(record, "latitude"),
        longitude: base.float(record, "longitude"),
        min_latitude: base.float(record, "min_latitude"),
        min_longitude: base.float(record, "min_longitude"),
        max_latitude: base.float(record, "max_latitude"),
        max_longitude: base.float(record, "max_longitude"),
        is_current: flag(record, "is_current"),
        is_deprecated: flag(record, "is_deprecated"),
        is_ceased: flag(record, "is_ceased"),
        is_superseded: flag(record, "is_superseded"),
        is_superseding: flag(record, "is_superseding"),
        superseded_by: base.first_int(record, "superseded_by"),
        supersedes: base.first_int(record, "supersedes"),
        lastmodified: base.int(record, "lastmodified"),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn clean_ancestor(base: &mut BaseImporter, record: &RawRecord) -> Option<WofAncestor> {
    let wok_id = wok_id(base, record)?;
    let Some(ancestor_id) = base.int(record, "ancestor_id") else {
        base.skip(record, format!("ancestor row for {} has no ancestor_id", wok_id));
        return None;
    };

    let now = base.now();
    Some(WofAncestor {
        wok_id,
        ancestor_id,
        ancestor_placetype: text(record, "ancestor_placetype"),
        lastmodified: base.int(record, "lastmodified"),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn clean_concordance(
    base: &mut BaseImporter,
    record: &RawRecord,
) -> Option<WofConcordance> {
    let wok_id = wok_id(base, record)?;
    let Some(other_id) = text(record, "other_id") else {
        base.skip(record, format!("concordance row for {} has no other_id", wok_id));
        return None;
    };

    let now = base.now();
    Some(WofConcordance {
        wok_id,
        other_id,
        other_source: text(record, "other_source"),
        lastmodified: base.int(record, "lastmodified"),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn clean_geojson(base: &mut BaseImporter, record: &RawRecord) -> Option<WofGeoJson> {
    let wok_id = wok_id(base, record)?;
    let Some(body) = text(record, "body") else {
        base.skip(record, format!("geojson row for {} has no body", wok_id));
        return None;
    };

    let now = base.now();
    Some(WofGeoJson {
        wok_id,
        body,
        source: text(record, "source"),
        alt_label: text(record, "alt_label"),
        is_alt: flag(record, "is_alt"),
        lastmodified: base.int(record, "lastmodified"),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn clean_name(base: &mut BaseImporter, record: &RawRecord) -> Option<WofName> {
    let wok_id = wok_id(base, record)?;
    let Some(name) = text(record, "name") else {
        base.skip(record, format!("names row for {} has no name", wok_id));
        return None;
    };

    let now = base.now();
    Some(WofName {
        wok_id,
        placetype: text(record, "placetype"),
        country: text(record, "country"),
        language: text(record, "language"),
        extlang: text(record, "extlang"),
        script: text(record, "script"),
        region: text(record, "region"),
        variant: text(record, "variant"),
        extension: text(record, "extension"),
        privateuse: text(record, "privateuse"),
        name,
        lastmodified: base.int(record, "lastmodified"),
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{WOF_NAMES_TABLE, WOF_SPR_TABLE};
    use std::fs;

    fn spr_row(values: &[&str]) -> RawRecord {
        let pairs: Vec<(&str, &str)> = SPR_FIELDS.iter().copied().zip(values.iter().copied()).collect();
        RawRecord::from_pairs(&pairs)
    }

    #[tokio::test]
    async fn test_spr_flags_and_supersession() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut base = BaseImporter::new(store, "/unused");
        let row = spr_row(&[
            "85953041", "85688727", "Minneapolis", "locality", "us", "whosonfirst-data-admin-us",
            "44.96", "-93.26", "44.89", "-93.33", "45.05", "-93.19", "True", "0", "n", "", "yes",
            "101, 102", "", "1690000000",
        ]);

        let place = clean_spr(&mut base, &row).unwrap();
        assert_eq!(place.country.as_deref(), Some("US"));
        assert_eq!(place.is_current, Some(true));
        assert_eq!(place.is_deprecated, Some(false));
        assert_eq!(place.is_ceased, Some(false));
        assert_eq!(place.is_superseded, None);
        assert_eq!(place.is_superseding, Some(true));
        assert_eq!(place.superseded_by, Some(101));
        assert_eq!(place.supersedes, None);
        assert!(!base.has_issues());
    }

    #[tokio::test]
    async fn test_spr_header_and_nameless_rows() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut base = BaseImporter::new(store, "/unused");

        assert!(clean_spr(&mut base, &spr_row(&["id", "parent_id", "name"])).is_none());
        assert_eq!(base.records_skipped, 0);

        let place = clean_spr(&mut base, &spr_row(&["7", "", "", "county"])).unwrap();
        assert_eq!(place.name, "Unnamed county #7");
    }

    #[tokio::test]
    async fn test_import_tables_from_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("spr")).unwrap();
        fs::write(
            dir.path().join("spr/spr.csv"),
            "id,parent_id,name,placetype,country\n85953041,85688727,Minneapolis,locality,US\n85688727,-1,Minnesota,region,US\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("names")).unwrap();
        fs::write(
            dir.path().join("names/names.csv"),
            "id,placetype,country,language,extlang,script,region,variant,extension,privateuse,name,lastmodified\n85953041,locality,US,eng,,Latn,,,,,Minneapolis,1\n85953041,locality,US,fra,,,,,,,,1\n",
        )
        .unwrap();

        let store = GazetteerStore::in_memory().await.unwrap();
        let result = WofImporter::new(store.clone(), dir.path()).import_data().await;

        assert_eq!(result.status, ImportStatus::PartialSuccess);
        assert_eq!(result.records_processed, 3);
        assert_eq!(result.records_skipped, 1);
        let tables = result.tables.unwrap();
        assert_eq!(tables["spr"].status, ImportStatus::Success);
        assert_eq!(tables["names"].status, ImportStatus::PartialSuccess);
        assert_eq!(tables["ancestors"].status, ImportStatus::Warning);
        assert_eq!(store.table_count(WOF_SPR_TABLE).await.unwrap(), 2);
        assert_eq!(store.table_count(WOF_NAMES_TABLE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_no_tables_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = GazetteerStore::in_memory().await.unwrap();
        let result = WofImporter::new(store, dir.path()).import_data().await;
        assert_eq!(result.status, ImportStatus::Error);
    }
}
