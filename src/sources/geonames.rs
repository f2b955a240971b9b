//! GeoNames dump download: a ZIP of tab-delimited `.txt` files.

use reqwest::Client;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{fetch_to_file, file_name_from_url, write_atomically, SourceError};

pub const COUNTRY_INFO_FILE: &str = "countryInfo.txt";

pub struct GeonamesSource {
    url: String,
    country_info_url: String,
    dir: PathBuf,
}

impl GeonamesSource {
    pub fn new(url: impl Into<String>, country_info_url: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            url: url.into(),
            country_info_url: country_info_url.into(),
            dir,
        }
    }

    /// Text file the archive is expected to unpack to (`US.zip` -> `US.txt`).
    fn target(&self) -> PathBuf {
        let archive = file_name_from_url(&self.url, "allCountries.zip");
        let stem = archive.strip_suffix(".zip").unwrap_or(&archive);
        self.dir.join(format!("{}.txt", stem))
    }

    /// Fetch and unpack the dump. Skips the archive when its text file is
    /// already present. `countryInfo.txt` is fetched on a best-effort basis.
    pub async fn download(&self, client: &Client) -> Result<Vec<PathBuf>, SourceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SourceError::io(&self.dir, e))?;

        let mut extracted = Vec::new();
        let target = self.target();
        if target.exists() {
            info!("GeoNames file {} exists, skipping download", target.display());
        } else {
            let archive = self
                .dir
                .join(file_name_from_url(&self.url, "allCountries.zip"));
            fetch_to_file(client, &self.url, &archive).await?;

            let dir = self.dir.clone();
            let archive_path = archive.clone();
            let unpacked =
                tokio::task::spawn_blocking(move || extract_text_members(&archive_path, &dir))
                    .await;

            tokio::fs::remove_file(&archive)
                .await
                .map_err(|e| SourceError::io(&archive, e))?;
            extracted = unpacked??;
            info!("Extracted {} GeoNames file(s)", extracted.len());
        }

        let country_info = self.dir.join(COUNTRY_INFO_FILE);
        if !country_info.exists() {
            if let Err(e) = fetch_to_file(client, &self.country_info_url, &country_info).await {
                warn!("Could not fetch {}: {}", COUNTRY_INFO_FILE, e);
            }
        }

        Ok(extracted)
    }
}

/// Unpack every `.txt` member of `archive` flat into `dir`.
pub(crate) fn extract_text_members(archive: &Path, dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let file = File::open(archive).map_err(|e| SourceError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;

    let mut extracted = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive member {}", entry.name());
            continue;
        };
        if name.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(file_name) = name.file_name() else {
            continue;
        };

        let out_path = dir.join(file_name);
        write_atomically(&out_path, |out| {
            std::io::copy(&mut entry, out).map_err(|e| SourceError::io(&out_path, e))
        })?;
        extracted.push(out_path);
    }

    if extracted.is_empty() {
        return Err(SourceError::MissingEntry {
            archive: archive.to_path_buf(),
            wanted: ".txt".to_string(),
        });
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_only_text_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("US.zip");
        write_zip(
            &archive,
            &[("US.txt", "5037649\tMinneapolis"), ("readme.pdf", "x")],
        );

        let extracted = extract_text_members(&archive, dir.path()).unwrap();
        assert_eq!(extracted, vec![dir.path().join("US.txt")]);
        assert!(!dir.path().join("readme.pdf").exists());
    }

    #[test]
    fn test_archive_without_text_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");
        write_zip(&archive, &[("notes.md", "x")]);

        let err = extract_text_members(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, SourceError::MissingEntry { .. }));
    }

    #[test]
    fn test_target_follows_archive_name() {
        let source = GeonamesSource::new(
            "https://download.geonames.org/export/dump/US.zip",
            "https://download.geonames.org/export/dump/countryInfo.txt",
            PathBuf::from("/data/geonames"),
        );
        assert_eq!(source.target(), PathBuf::from("/data/geonames/US.txt"));
    }
}
