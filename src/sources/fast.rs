//! OCLC FAST geographic headings, published as a zipped MARCXML file.

use reqwest::Client;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{fetch_to_file, file_name_from_url, write_atomically, SourceError};

pub const FAST_MARCXML_FILE: &str = "FASTGeographic.marcxml";

pub struct FastSource {
    url: String,
    dir: PathBuf,
}

impl FastSource {
    pub fn new(url: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            url: url.into(),
            dir,
        }
    }

    pub fn marcxml_path(&self) -> PathBuf {
        self.dir.join(FAST_MARCXML_FILE)
    }

    /// Download the archive to a scratch directory and keep only the first
    /// `.marcxml` member.
    pub async fn download(&self, client: &Client) -> Result<PathBuf, SourceError> {
        let target = self.marcxml_path();
        if target.exists() {
            info!("FAST file {} exists, skipping download", target.display());
            return Ok(target);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SourceError::io(&self.dir, e))?;

        let scratch = tempfile::tempdir().map_err(|e| SourceError::io(&self.dir, e))?;
        let archive = scratch
            .path()
            .join(file_name_from_url(&self.url, "FASTGeographic.marcxml.zip"));
        let bytes = fetch_to_file(client, &self.url, &archive).await?;
        if bytes == 0 {
            return Err(SourceError::Empty(archive));
        }

        let dest = target.clone();
        tokio::task::spawn_blocking(move || extract_marcxml(&archive, &dest)).await??;
        info!("Extracted FAST MARCXML to {}", target.display());
        Ok(target)
    }
}

pub(crate) fn extract_marcxml(archive: &Path, dest: &Path) -> Result<(), SourceError> {
    let file = File::open(archive).map_err(|e| SourceError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;

    let member = zip
        .file_names()
        .find(|name| name.to_ascii_lowercase().ends_with(".marcxml"))
        .map(|name| name.to_string())
        .ok_or_else(|| SourceError::MissingEntry {
            archive: archive.to_path_buf(),
            wanted: ".marcxml".to_string(),
        })?;

    let mut entry = zip.by_name(&member)?;
    write_atomically(dest, |out| {
        std::io::copy(&mut entry, out).map_err(|e| SourceError::io(dest, e))
    })?;
    Ok(())
}
