//! BTAA geoportal region importer. CSVs carry a header row with the
//! geoportal's own column names.

use std::path::PathBuf;
use tracing::info;

use super::{load_files, BaseImporter, ImportResult, ImportStatus, RawRecord};
use crate::models::BtaaRegion;
use crate::store::{GazetteerStore, LoadOptions};

/// CSV header -> column
pub const FIELD_MAPPING: &[(&str, &str)] = &[
    ("Fast", "fast_area"),
    ("Bounding Box", "bounding_box"),
    ("Geometry", "geometry"),
    ("GeoNames ID", "geonames_id"),
    ("State Abbv", "state_abbv"),
    ("State Name", "state_name"),
    ("County_FIPS", "county_fips"),
    ("STATEFP", "statefp"),
    ("NAMELSAD", "namelsad"),
];

fn column<'a>(record: &'a RawRecord, column: &str) -> Option<&'a str> {
    FIELD_MAPPING
        .iter()
        .find(|(_, c)| *c == column)
        .and_then(|(header, _)| record.get(header))
}

pub struct BtaaImporter {
    base: BaseImporter,
    options: LoadOptions,
}

impl BtaaImporter {
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

    pub async fn import_data(mut self) -> ImportResult {
        let files = self.base.find_files("csv");
        if files.is_empty() {
            let message = format!("No CSV files found in {}", self.base.data_dir().display());
            tracing::error!("{}", message);
            return self.base.result_with(ImportStatus::Error, Some(message));
        }

        if let Err(e) = load_files(&mut self.base, &files, b',', None, self.options, clean_record).await
        {
            return self.base.fail(e);
        }

        let result = self.base.result();
        info!(
            "BTAA import completed: {} records in {:.2}s ({:.1} records/sec)",
            result.records_processed, result.elapsed_time, result.records_per_second
        );
        result
    }
}

pub(crate) fn clean_record(base: &mut BaseImporter, record: &RawRecord) -> Option<BtaaRegion> {
    let text = |name: &str| column(record, name).map(str::to_string);
    let now = base.now();

    Some(BtaaRegion {
        id: None,
        fast_area: text("fast_area").unwrap_or_else(|| "Unknown".to_string()),
        bounding_box: text("bounding_box"),
        geometry: text("geometry"),
        geonames_id: text("geonames_id"),
        state_abbv: column(record, "state_abbv")
            .map(|s| s.chars().take(2).collect::<String>().to_uppercase()),
        state_name: text("state_name"),
        county_fips: text("county_fips"),
        statefp: text("statefp"),
        namelsad: text("namelsad"),
        created_at: now,
        updated_at: now,
    })
}
