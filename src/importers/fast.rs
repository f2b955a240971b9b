//! OCLC FAST geographic importer.
//!
//! Streams `FASTGeographic.marcxml`, keeps records with a FAST id and a
//! heading, writes them to `fast_geographic.csv` and loads the table.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::marc::{FastExtractor, MarcReader};
use super::{BaseImporter, ImportResult, ImportStatus};
use crate::models::FastEntry;
use crate::sources::fast::FAST_MARCXML_FILE;
use crate::store::{GazetteerStore, LoadOptions};

pub const FAST_CSV_FILE: &str = "fast_geographic.csv";
pub const FAST_CSV_FIELDS: [&str; 7] = [
    "fast_id",
    "uri",
    "type",
    "label",
    "geoname_id",
    "viaf_id",
    "wikipedia_id",
];

pub const FAST_CHUNK_SIZE: usize = 1000;
pub const FAST_CHUNK_DELAY: Duration = Duration::from_millis(100);

pub struct FastImporter {
    base: BaseImporter,
    options: LoadOptions,
}

impl FastImporter {
    pub fn new(store: GazetteerStore, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base: BaseImporter::new(store, data_dir),
            options: LoadOptions {
                chunk_size: FAST_CHUNK_SIZE,
                delay: Some(FAST_CHUNK_DELAY),
            },
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn marcxml_path(&self) -> PathBuf {
        self.base.data_dir().join(FAST_MARCXML_FILE)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.base.data_dir().join(FAST_CSV_FILE)
    }

    pub async fn import_data(mut self) -> ImportResult {
        let path = self.marcxml_path();
        if !path.exists() {
            let message = format!("FAST MARCXML file not found: {}", path.display());
            tracing::error!("{}", message);
            return self.base.result_with(ImportStatus::Error, Some(message));
        }

        if let Err(e) = self.load(&path).await {
            return self.base.fail(e);
        }

        let result = self.base.result();
        info!(
            "FAST import completed: {} headings, {} records dropped in {:.2}s",
            result.records_processed, result.records_skipped, result.elapsed_time
        );
        result
    }

    async fn load(&mut self, path: &Path) -> Result<()> {
        let extractor = FastExtractor::new()?;
        self.base.begin_file(path);
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = MarcReader::new(BufReader::new(file));

        let csv_path = self.csv_path();
        let mut csv = csv::Writer::from_path(&csv_path)
            .with_context(|| format!("Failed to create {}", csv_path.display()))?;
        csv.write_record(FAST_CSV_FIELDS)?;

        let store = self.base.store.clone();
        let mut loader = store.replace_all::<FastEntry>(self.options).await?;
        let now = self.base.now();

        for record in reader {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    self.base.record_issue(None, format!("{:#}", e));
                    break;
                }
            };

            let Some(entry) = extractor.extract(&record, now) else {
                debug!("Dropping MARC record without FAST id or heading");
                self.base.records_skipped += 1;
                continue;
            };

            write_row(&mut csv, &entry)?;
            loader.add(entry).await?;
            self.base.records_processed += 1;
        }
        self.base.files_processed += 1;

        csv.flush()
            .with_context(|| format!("Failed to write {}", csv_path.display()))?;
        info!("Exported FAST headings to {}", csv_path.display());

        let stats = loader.finish().await?;
        debug!("FAST load: {} rows in {} chunks", stats.rows_written, stats.chunks);
        Ok(())
    }
}

fn write_row(csv: &mut csv::Writer<File>, entry: &FastEntry) -> Result<()> {
    let optional = |value: &Option<String>| value.clone().unwrap_or_default();
    csv.write_record([
        entry.fast_id.clone(),
        entry.uri.clone(),
        entry.entry_type.clone(),
        entry.label.clone(),
        optional(&entry.geoname_id),
        optional(&entry.viaf_id),
        optional(&entry.wikipedia_id),
    ])?;
    Ok(())
}
