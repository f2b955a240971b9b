//! Source importers.
//!
//! Every importer reads delimited files from its data directory, turns rows
//! into record structs and replaces the target table through the store's
//! chunked loader. Bad values become nulls, bad rows are skipped, bad files
//! are recorded; only store failures stop an import.

pub mod btaa;
pub mod fast;
pub mod geonames;
pub mod marc;
pub mod orchestrator;
pub mod wof;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::store::{GazetteerStore, GazetteerTable, LoadOptions, LoadStats};

pub use btaa::BtaaImporter;
pub use fast::FastImporter;
pub use geonames::GeonamesImporter;
pub use orchestrator::{import_sources, ImportSummary};
pub use wof::WofImporter;

/// Per-record issue details kept in a result; the rest are only counted.
pub const MAX_ISSUES: usize = 100;

const PROGRESS_EVERY: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Success,
    PartialSuccess,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub status: ImportStatus,
    pub files_processed: usize,
    pub records_processed: usize,
    pub records_skipped: usize,
    pub errors: Vec<ImportIssue>,
    /// Issues beyond [`MAX_ISSUES`]
    pub errors_suppressed: usize,
    /// Seconds
    pub elapsed_time: f64,
    pub records_per_second: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Per-table results for multi-table sources (WOF)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<BTreeMap<String, ImportResult>>,
}

impl ImportResult {
    pub fn error_count(&self) -> usize {
        self.errors.len() + self.errors_suppressed
    }
}

/// One delimited row, addressable by column name.
#[derive(Debug, Clone)]
pub struct RawRecord {
    headers: Arc<Vec<String>>,
    values: StringRecord,
    line: u64,
}

impl RawRecord {
    /// Column value; empty and whitespace-only values read as missing.
    pub fn get(&self, field: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == field)?;
        self.values
            .get(idx)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            headers: Arc::new(pairs.iter().map(|(k, _)| k.to_string()).collect()),
            values: pairs.iter().map(|(_, v)| *v).collect(),
            line: 1,
        }
    }
}

/// Row iterator over one delimited file.
pub struct DelimitedReader {
    reader: csv::Reader<Box<dyn Read>>,
    headers: Arc<Vec<String>>,
}

impl DelimitedReader {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for DelimitedReader {
    type Item = csv::Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut values = StringRecord::new();
        match self.reader.read_record(&mut values) {
            Ok(true) => {
                let line = values.position().map(|p| p.line()).unwrap_or(0);
                Some(Ok(RawRecord {
                    headers: self.headers.clone(),
                    values,
                    line,
                }))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// State shared by every importer: where the files are, the run timestamp,
/// counters and the issue log.
pub struct BaseImporter {
    pub(crate) store: GazetteerStore,
    data_dir: PathBuf,
    started: Instant,
    now: DateTime<Utc>,
    current_file: Option<String>,
    issues: Vec<ImportIssue>,
    issues_suppressed: usize,
    pub files_processed: usize,
    pub records_processed: usize,
    pub records_skipped: usize,
}

impl BaseImporter {
    pub fn new(store: GazetteerStore, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            data_dir: data_dir.into(),
            started: Instant::now(),
            now: Utc::now(),
            current_file: None,
            issues: Vec::new(),
            issues_suppressed: 0,
            files_processed: 0,
            records_processed: 0,
            records_skipped: 0,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Timestamp stamped on every record of this run.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Files under the data directory ending in `.{ext}` or `.{ext}.gz`,
    /// sorted by path.
    pub fn find_files(&self, ext: &str) -> Vec<PathBuf> {
        find_files(&self.data_dir, ext)
    }

    /// Open a delimited file. Without `fieldnames` the first row is the
    /// header. Tab-delimited files are read without quote handling.
    pub fn read(
        &self,
        path: &Path,
        delimiter: u8,
        fieldnames: Option<&[&str]>,
    ) -> Result<DelimitedReader> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let input: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(fieldnames.is_none())
            .flexible(true)
            .quoting(delimiter != b'\t')
            .from_reader(input);

        let headers: Vec<String> = match fieldnames {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => reader
                .headers()
                .with_context(|| format!("Failed to read header of {}", path.display()))?
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
                .collect(),
        };

        Ok(DelimitedReader {
            reader,
            headers: Arc::new(headers),
        })
    }

    pub fn begin_file(&mut self, path: &Path) {
        info!("Processing file: {}", path.display());
        self.current_file = Some(path.display().to_string());
    }

    /// Record a problem against the current file.
    pub fn record_issue(&mut self, line: Option<u64>, message: impl Into<String>) {
        let message = message.into();
        warn!(
            "{}{}: {}",
            self.current_file.as_deref().unwrap_or("import"),
            line.map(|l| format!(":{}", l)).unwrap_or_default(),
            message
        );
        if self.issues.len() < MAX_ISSUES {
            self.issues.push(ImportIssue {
                file: self.current_file.clone(),
                line,
                message,
            });
        } else {
            self.issues_suppressed += 1;
        }
    }

    /// Count a dropped row and say why.
    pub fn skip(&mut self, record: &RawRecord, reason: impl Into<String>) {
        self.records_skipped += 1;
        self.record_issue(Some(record.line()), reason);
    }

    /// A read error on one row. I/O failures end the file; anything else
    /// only loses the row. Returns whether reading can continue.
    pub fn row_error(&mut self, err: csv::Error) -> bool {
        let fatal = err.is_io_error();
        let line = err.position().map(|p| p.line());
        if !fatal {
            self.records_skipped += 1;
        }
        self.record_issue(line, format!("unreadable row: {}", err));
        !fatal
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty() || self.issues_suppressed > 0
    }

    pub fn int(&mut self, record: &RawRecord, field: &str) -> Option<i64> {
        let raw = record.get(field)?;
        match parse_i64(raw) {
            Some(v) => Some(v),
            None => {
                self.record_issue(
                    Some(record.line()),
                    format!("invalid integer for {}: {:?}", field, raw),
                );
                None
            }
        }
    }

    pub fn float(&mut self, record: &RawRecord, field: &str) -> Option<f64> {
        let raw = record.get(field)?;
        match parse_f64(raw) {
            Some(v) => Some(v),
            None => {
                self.record_issue(
                    Some(record.line()),
                    format!("invalid number for {}: {:?}", field, raw),
                );
                None
            }
        }
    }

    pub fn date(&mut self, record: &RawRecord, field: &str) -> Option<NaiveDate> {
        let raw = record.get(field)?;
        match parse_date(raw) {
            Some(v) => Some(v),
            None => {
                self.record_issue(
                    Some(record.line()),
                    format!("invalid date for {}: {:?}", field, raw),
                );
                None
            }
        }
    }

    /// First id of a comma separated list.
    pub fn first_int(&mut self, record: &RawRecord, field: &str) -> Option<i64> {
        let raw = record.get(field)?;
        let first = raw.split(',').next().unwrap_or(raw);
        match parse_i64(first) {
            Some(v) => Some(v),
            None => {
                self.record_issue(
                    Some(record.line()),
                    format!("invalid id list for {}: {:?}", field, raw),
                );
                None
            }
        }
    }

    fn elapsed_and_rate(&self) -> (f64, f64) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.records_processed as f64 / elapsed
        } else {
            0.0
        };
        (elapsed, rate)
    }

    /// Result for a run that reached the end.
    pub fn result(&self) -> ImportResult {
        let status = if self.has_issues() {
            ImportStatus::PartialSuccess
        } else {
            ImportStatus::Success
        };
        self.result_with(status, None)
    }

    /// Result for a run that stopped early or found nothing to do.
    pub fn result_with(&self, status: ImportStatus, message: Option<String>) -> ImportResult {
        let (elapsed_time, records_per_second) = self.elapsed_and_rate();
        ImportResult {
            status,
            files_processed: self.files_processed,
            records_processed: self.records_processed,
            records_skipped: self.records_skipped,
            errors: self.issues.clone(),
            errors_suppressed: self.issues_suppressed,
            elapsed_time,
            records_per_second,
            message,
            tables: None,
        }
    }

    pub fn fail(&self, err: anyhow::Error) -> ImportResult {
        tracing::error!("Import aborted: {:#}", err);
        self.result_with(ImportStatus::Error, Some(format!("{:#}", err)))
    }
}

/// Replace `T::TABLE` with the rows of `files`, converted by `clean`.
/// Unreadable files are recorded and skipped.
pub(crate) async fn load_files<T, F>(
    base: &mut BaseImporter,
    files: &[PathBuf],
    delimiter: u8,
    fieldnames: Option<&[&str]>,
    options: LoadOptions,
    mut clean: F,
) -> Result<LoadStats>
where
    T: GazetteerTable,
    F: FnMut(&mut BaseImporter, &RawRecord) -> Option<T>,
{
    let store = base.store.clone();
    let mut loader = store.replace_all::<T>(options).await?;

    for path in files {
        base.begin_file(path);
        let reader = match base.read(path, delimiter, fieldnames) {
            Ok(reader) => reader,
            Err(e) => {
                base.record_issue(None, format!("{:#}", e));
                continue;
            }
        };

        for row in reader {
            let record = match row {
                Ok(record) => record,
                Err(e) => {
                    if base.row_error(e) {
                        continue;
                    }
                    break;
                }
            };

            if let Some(item) = clean(base, &record) {
                loader.add(item).await?;
                base.records_processed += 1;
                if base.records_processed % PROGRESS_EVERY == 0 {
                    info!("{}: {} records loaded", T::TABLE, base.records_processed);
                }
            }
        }
        base.files_processed += 1;
    }

    loader.finish().await
}

pub(crate) fn find_files(dir: &Path, ext: &str) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Data directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let plain = format!(".{}", ext.to_ascii_lowercase());
    let gz = format!("{}.gz", plain);
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            name.ends_with(&plain) || name.ends_with(&gz)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    info!("Found {} .{} file(s) in {}", files.len(), ext, dir.display());
    files
}

/// Floats in `[-2^63, 2^63)` convert to i64 without saturating.
const I64_FLOAT_RANGE: std::ops::Range<f64> =
    -9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0;

pub fn parse_i64(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        // Integral values exported as floats ("12.0")
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && I64_FLOAT_RANGE.contains(f))
            .map(|f| f as i64)
    })
}

pub fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// `YYYY-MM-DD` only.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// `true/1/t/yes/y` in any case is true; any other value is false.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "yes" | "y"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_flag_literals() {
        for raw in ["true", "TRUE", "1", "t", "Yes", "y"] {
            assert!(parse_flag(raw), "{raw}");
        }
        for raw in ["false", "0", "no", "n", "2", "maybe"] {
            assert!(!parse_flag(raw), "{raw}");
        }
    }

    #[test]
    fn test_parse_date_requires_iso_format() {
        assert_eq!(parse_date("2023-04-05"), NaiveDate::from_ymd_opt(2023, 4, 5));
        assert_eq!(parse_date("05/04/2023"), None);
        assert_eq!(parse_date("2023-13-01"), None);
    }

    #[test]
    fn test_parse_i64_accepts_integral_floats() {
        assert_eq!(parse_i64("42"), Some(42));
        assert_eq!(parse_i64("42.0"), Some(42));
        assert_eq!(parse_i64("42.5"), None);
        assert_eq!(parse_i64("abc"), None);
        assert_eq!(parse_i64("-9223372036854775808.0"), Some(i64::MIN));
        assert_eq!(parse_i64("1e19"), None);
        assert_eq!(parse_i64("-1e300"), None);
        assert_eq!(parse_i64("inf"), None);
    }

    #[test]
    fn test_raw_record_treats_blank_as_missing() {
        let rec = RawRecord::from_pairs(&[("name", "Minneapolis"), ("cc2", ""), ("dem", "  ")]);
        assert_eq!(rec.get("name"), Some("Minneapolis"));
        assert_eq!(rec.get("cc2"), None);
        assert_eq!(rec.get("dem"), None);
        assert_eq!(rec.get("absent"), None);
    }

    #[tokio::test]
    async fn test_coercion_failure_is_recorded_not_fatal() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut base = BaseImporter::new(store, "/nonexistent");
        let rec = RawRecord::from_pairs(&[("population", "lots"), ("elevation", "256")]);

        assert_eq!(base.int(&rec, "population"), None);
        assert_eq!(base.int(&rec, "elevation"), Some(256));
        assert!(base.has_issues());
        assert_eq!(base.result().status, ImportStatus::PartialSuccess);
        assert_eq!(base.records_skipped, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_integer_is_recorded() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut base = BaseImporter::new(store, "/nonexistent");
        let rec = RawRecord::from_pairs(&[("population", "1e20")]);

        assert_eq!(base.int(&rec, "population"), None);
        let result = base.result();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("population"));
    }

    #[tokio::test]
    async fn test_issue_log_is_capped() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut base = BaseImporter::new(store, "/nonexistent");
        for i in 0..(MAX_ISSUES + 5) {
            base.record_issue(Some(i as u64), "bad");
        }
        let result = base.result();
        assert_eq!(result.errors.len(), MAX_ISSUES);
        assert_eq!(result.errors_suppressed, 5);
        assert_eq!(result.error_count(), MAX_ISSUES + 5);
    }

    #[tokio::test]
    async fn test_read_header_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.csv.gz");
        let mut gz = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        gz.write_all(b"\xef\xbb\xbfFast,State Abbv\nMinnesota,MN\n").unwrap();
        gz.finish().unwrap();

        let store = GazetteerStore::in_memory().await.unwrap();
        let base = BaseImporter::new(store, dir.path());
        assert_eq!(base.find_files("csv"), vec![path.clone()]);

        let reader = base.read(&path, b',', None).unwrap();
        assert_eq!(reader.headers(), &["Fast".to_string(), "State Abbv".to_string()]);
        let rows: Vec<RawRecord> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("State Abbv"), Some("MN"));
    }

    #[tokio::test]
    async fn test_tab_files_ignore_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("US.txt");
        std::fs::write(&path, "1\t\"Quoted\" Place\tx\n").unwrap();

        let store = GazetteerStore::in_memory().await.unwrap();
        let base = BaseImporter::new(store, dir.path());
        let rows: Vec<RawRecord> = base
            .read(&path, b'\t', Some(&["id", "name", "other"][..]))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[0].get("name"), Some("\"Quoted\" Place"));
    }
}
