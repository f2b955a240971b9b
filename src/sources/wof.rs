//! Who's On First distribution: a bzip2-compressed SQLite database that is
//! exported table by table to CSV for the importer.

use bzip2::read::MultiBzDecoder;
use futures::TryStreamExt;
use reqwest::Client;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Row, SqliteConnection};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{fetch_to_file, file_name_from_url, write_atomically, SourceError};

pub struct WofSource {
    url: String,
    dir: PathBuf,
}

impl WofSource {
    pub fn new(url: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            url: url.into(),
            dir,
        }
    }

    /// Local path of the decompressed database.
    pub fn database_path(&self) -> PathBuf {
        let archive = file_name_from_url(&self.url, "whosonfirst-data-latest.db.bz2");
        let name = archive.strip_suffix(".bz2").unwrap_or(&archive);
        self.dir.join(name)
    }

    /// Fetch and decompress the database unless it is already on disk.
    pub async fn download(&self, client: &Client) -> Result<PathBuf, SourceError> {
        let db_path = self.database_path();
        if db_path.exists() {
            info!("WOF database {} exists, skipping download", db_path.display());
            return Ok(db_path);
        }

        let archive = self
            .dir
            .join(file_name_from_url(&self.url, "whosonfirst-data-latest.db.bz2"));
        fetch_to_file(client, &self.url, &archive).await?;

        let src = archive.clone();
        let dest = db_path.clone();
        let decompressed = tokio::task::spawn_blocking(move || decompress_bz2(&src, &dest)).await;

        tokio::fs::remove_file(&archive)
            .await
            .map_err(|e| SourceError::io(&archive, e))?;
        let bytes = decompressed??;
        info!("Decompressed WOF database ({} bytes)", bytes);
        Ok(db_path)
    }

    /// Write every table of the downloaded database to
    /// `<dir>/<table>/<table>.csv`, header row first.
    pub async fn export(&self) -> Result<Vec<PathBuf>, SourceError> {
        export_tables(&self.database_path(), &self.dir).await
    }
}

/// Streaming bzip2 decompression. Handles multi-stream archives.
pub(crate) fn decompress_bz2(src: &Path, dest: &Path) -> Result<u64, SourceError> {
    let input = File::open(src).map_err(|e| SourceError::io(src, e))?;
    let mut decoder = MultiBzDecoder::new(BufReader::new(input));
    write_atomically(dest, |output| {
        let mut writer = BufWriter::new(output);
        let bytes =
            std::io::copy(&mut decoder, &mut writer).map_err(|e| SourceError::io(dest, e))?;
        writer.flush().map_err(|e| SourceError::io(dest, e))?;
        if bytes == 0 {
            return Err(SourceError::Empty(dest.to_path_buf()));
        }
        Ok(bytes)
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) async fn export_tables(db_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);
    let mut conn = SqliteConnection::connect_with(&options).await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&mut conn)
    .await?;

    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(&table)
                .fetch_all(&mut conn)
                .await?;
        if columns.is_empty() {
            continue;
        }

        let table_dir = out_dir.join(&table);
        std::fs::create_dir_all(&table_dir).map_err(|e| SourceError::io(&table_dir, e))?;
        let csv_path = table_dir.join(format!("{}.csv", table));
        let mut writer = csv::Writer::from_path(&csv_path)?;
        writer.write_record(&columns)?;

        let select = columns
            .iter()
            .map(|c| format!("CAST({} AS TEXT)", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", select, quote_ident(&table));

        let mut rows = sqlx::query(&sql).fetch(&mut conn);
        let mut count: u64 = 0;
        while let Some(row) = rows.try_next().await? {
            let mut record = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: Option<String> = row.try_get(i)?;
                record.push(value.unwrap_or_default());
            }
            writer.write_record(&record)?;
            count += 1;
        }
        drop(rows);
        writer.flush().map_err(|e| SourceError::io(&csv_path, e))?;

        debug!("Exported {} rows from {}", count, table);
        written.push(csv_path);
    }

    conn.close().await?;
    info!("Exported {} WOF tables", written.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    #[test]
    fn test_decompress_bz2() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.db.bz2");
        let mut encoder = BzEncoder::new(File::create(&src).unwrap(), Compression::best());
        encoder.write_all(b"SQLite format 3\0").unwrap();
        encoder.finish().unwrap();

        let dest = dir.path().join("data.db");
        let bytes = decompress_bz2(&src, &dest).unwrap();
        assert_eq!(bytes, 16);
        assert_eq!(std::fs::read(&dest).unwrap(), b"SQLite format 3\0");
    }

    #[test]
    fn test_corrupt_archive_leaves_no_database() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.db.bz2");
        std::fs::write(&src, b"this is not bzip2 data").unwrap();

        let dest = dir.path().join("data.db");
        assert!(decompress_bz2(&src, &dest).is_err());
        assert!(!dest.exists());
        assert!(!dir.path().join("data.db.part").exists());
    }

    #[test]
    fn test_database_path_strips_bz2() {
        let source = WofSource::new(
            "https://data.geocode.earth/wof/dist/sqlite/whosonfirst-data-admin-us-latest.db.bz2",
            PathBuf::from("/data/wof"),
        );
        assert_eq!(
            source.database_path(),
            PathBuf::from("/data/wof/whosonfirst-data-admin-us-latest.db")
        );
    }

    #[tokio::test]
    async fn test_export_writes_one_csv_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("wof.db");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        sqlx::query("CREATE TABLE spr (id INTEGER, name TEXT, is_current INTEGER)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO spr VALUES (85953041, 'Minneapolis', 1), (2, NULL, 0)")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE ancestors (id INTEGER, ancestor_id INTEGER)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();

        let written = export_tables(&db_path, dir.path()).await.unwrap();
        assert_eq!(written.len(), 2);

        let spr = std::fs::read_to_string(dir.path().join("spr/spr.csv")).unwrap();
        assert_eq!(spr, "id,name,is_current\n85953041,Minneapolis,1\n2,,0\n");

        let ancestors =
            std::fs::read_to_string(dir.path().join("ancestors/ancestors.csv")).unwrap();
        assert_eq!(ancestors, "id,ancestor_id\n");
    }
}
