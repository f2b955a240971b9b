//! GeoNames dump importer.
//! See: https://download.geonames.org/export/dump/readme.txt

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{load_files, BaseImporter, ImportResult, ImportStatus, RawRecord};
use crate::models::{Country, GeonamesRecord};
use crate::sources::geonames::COUNTRY_INFO_FILE;
use crate::store::{GazetteerStore, LoadOptions};

/// Column order of the tab-delimited dump (no header row).
pub const GEONAMES_FIELDS: [&str; 19] = [
    "geonameid",
    "name",
    "asciiname",
    "alternatenames",
    "latitude",
    "longitude",
    "feature_class",
    "feature_code",
    "country_code",
    "cc2",
    "admin1_code",
    "admin2_code",
    "admin3_code",
    "admin4_code",
    "population",
    "elevation",
    "dem",
    "timezone",
    "modification_date",
];

const COUNTRY_INFO_FIELDS: [&str; 5] = ["iso_alpha2", "iso_alpha3", "iso_numeric", "fips", "name"];

/// Text files shipped next to the dumps that are not dumps themselves.
const AUXILIARY_FILES: &[&str] = &[
    "countryinfo.txt",
    "readme.txt",
    "featurecodes_en.txt",
    "timezones.txt",
    "iso-languagecodes.txt",
    "admin1codesascii.txt",
    "admin2codes.txt",
];

pub struct GeonamesImporter {
    base: BaseImporter,
    options: LoadOptions,
}

impl GeonamesImporter {
    pub fn new(store: GazetteerStore, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base: BaseImporter::new(store, data_dir),
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    fn dump_files(&self) -> Vec<PathBuf> {
        self.base
            .find_files("txt")
            .into_iter()
            .filter(|path| !is_auxiliary(path))
            .collect()
    }

    pub async fn import_data(mut self) -> ImportResult {
        let files = self.dump_files();
        if files.is_empty() {
            let message = format!(
                "No GeoNames .txt files found in {}",
                self.base.data_dir().display()
            );
            return self.base.result_with(ImportStatus::Error, Some(message));
        }

        if let Err(e) = self.load_places(&files).await {
            return self.base.fail(e);
        }
        if let Err(e) = self.load_countries().await {
            return self.base.fail(e);
        }

        let result = self.base.result();
        info!(
            "GeoNames import completed: {} records, {} skipped in {:.2}s",
            result.records_processed, result.records_skipped, result.elapsed_time
        );
        result
    }

    async fn load_places(&mut self, files: &[PathBuf]) -> Result<()> {
        load_files(
            &mut self.base,
            files,
            b'\t',
            Some(&GEONAMES_FIELDS[..]),
            self.options,
            clean_record,
        )
        .await?;
        Ok(())
    }

    /// Refresh the country name table from `countryInfo.txt` when present.
    async fn load_countries(&mut self) -> Result<()> {
        let path = self.base.data_dir().join(COUNTRY_INFO_FILE);
        if !path.exists() {
            return Ok(());
        }

        self.base.begin_file(&path);
        let reader = self.base.read(&path, b'\t', Some(&COUNTRY_INFO_FIELDS[..]))?;
        let now = self.base.now();
        let mut countries = Vec::new();
        for row in reader {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    if self.base.row_error(e) {
                        continue;
                    }
                    break;
                }
            };
            let Some(iso) = row.get("iso_alpha2") else {
                self.base.record_issue(Some(row.line()), "country row has no ISO code");
                continue;
            };
            if iso.starts_with('#') {
                continue;
            }
            if iso.chars().count() != 2 {
                self.base.record_issue(
                    Some(row.line()),
                    format!("invalid ISO alpha-2 code: {:?}", iso),
                );
                continue;
            }
            let Some(name) = row.get("name") else {
                self.base
                    .record_issue(Some(row.line()), format!("country {} has no name", iso));
                continue;
            };
            countries.push(Country {
                iso_alpha2: iso.to_uppercase(),
                name: name.to_string(),
                created_at: now,
                updated_at: now,
            });
        }

        let mut loader = self
            .base
            .store
            .replace_all::<Country>(LoadOptions::default())
            .await?;
        let count = countries.len();
        loader.extend(countries).await?;
        loader.finish().await?;
        info!("Loaded {} country names", count);
        Ok(())
    }
}

fn is_auxiliary(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .map_or(false, |name| AUXILIARY_FILES.contains(&name.as_str()))
}

fn code(value: Option<&str>, max_len: usize) -> Option<String> {
    value.map(|v| v.chars().take(max_len).collect::<String>().to_ascii_uppercase())
}

/// Build a record from one dump row. Rows without a usable `geonameid`
/// are skipped.
pub(crate) fn clean_record(base: &mut BaseImporter, record: &RawRecord) -> Option<GeonamesRecord> {
    let Some(geonameid) = base.int(record, "geonameid") else {
        base.skip(record, "missing or invalid geonameid");
        return None;
    };

    let name = record.get("name");
    let asciiname = record.get("asciiname");
    let (name, asciiname) = match (name, asciiname) {
        (Some(n), Some(a)) => (n.to_string(), a.to_string()),
        (Some(n), None) => (n.to_string(), n.to_string()),
        (None, Some(a)) => (a.to_string(), a.to_string()),
        (None, None) => ("Unknown".to_string(), "Unknown".to_string()),
    };

    let now = base.now();
    Some(GeonamesRecord {
        geonameid,
        name,
        asciiname,
        alternatenames: record.get("alternatenames").map(str::to_string),
        latitude: base.float(record, "latitude"),
        longitude: base.float(record, "longitude"),
        feature_class: code(record.get("feature_class"), 1),
        feature_code: record.get("feature_code").map(str::to_string),
        country_code: code(record.get("country_code"), 2),
        cc2: record.get("cc2").map(str::to_string),
        admin1_code: record.get("admin1_code").map(str::to_string),
        admin2_code: record.get("admin2_code").map(str::to_string),
        admin3_code: record.get("admin3_code").map(str::to_string),
        admin4_code: record.get("admin4_code").map(str::to_string),
        population: base.int(record, "population"),
        elevation: base.int(record, "elevation"),
        dem: base.int(record, "dem"),
        timezone: record.get("timezone").map(str::to_string),
        modification_date: base.date(record, "modification_date"),
        created_at: now,
        updated_at: now,
    })
}
