//! Runtime configuration loaded from TOML.
//!
//! Every key has a default, so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::sources::GazetteerSource;

pub const DEFAULT_GEONAMES_URL: &str = "https://download.geonames.org/export/dump/US.zip";
pub const DEFAULT_GEONAMES_COUNTRY_INFO_URL: &str =
    "https://download.geonames.org/export/dump/countryInfo.txt";
pub const DEFAULT_WOF_URL: &str =
    "https://data.geocode.earth/wof/dist/sqlite/whosonfirst-data-admin-us-latest.db.bz2";
pub const DEFAULT_FAST_URL: &str =
    "https://researchworks.oclc.org/researchdata/fast/FASTGeographic.marcxml.zip";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub download_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://gazetteer.db".to_string(),
            data_dir: PathBuf::from("data/gazetteers"),
            download_timeout_secs: 30,
            cache_ttl_secs: 3600,
            cache_max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub geonames: SourceConfig,
    pub wof: SourceConfig,
    pub fast: SourceConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// Archive URL; falls back to the public default for the source.
    pub url: Option<String>,
    /// Auxiliary file URL (GeoNames countryInfo.txt).
    pub extra_url: Option<String>,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        for source in [
            GazetteerSource::Geonames,
            GazetteerSource::Wof,
            GazetteerSource::Fast,
        ] {
            if let Some(url) = self.source_url(source) {
                Url::parse(&url).with_context(|| format!("Invalid {} url: {}", source, url))?;
            }
        }
        Ok(())
    }

    /// Download URL for a source. BTAA has none.
    pub fn source_url(&self, source: GazetteerSource) -> Option<String> {
        match source {
            GazetteerSource::Geonames => Some(
                self.sources
                    .geonames
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GEONAMES_URL.to_string()),
            ),
            GazetteerSource::Wof => Some(
                self.sources
                    .wof
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_WOF_URL.to_string()),
            ),
            GazetteerSource::Fast => Some(
                self.sources
                    .fast
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAST_URL.to_string()),
            ),
            GazetteerSource::Btaa => None,
        }
    }

    pub fn country_info_url(&self) -> String {
        self.sources
            .geonames
            .extra_url
            .clone()
            .unwrap_or_else(|| DEFAULT_GEONAMES_COUNTRY_INFO_URL.to_string())
    }

    /// Per-source directory under `data_dir`.
    pub fn source_dir(&self, data_dir: &Path, source: GazetteerSource) -> PathBuf {
        data_dir.join(source.dir_name())
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.global.download_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.global.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [global]
            database_url = "sqlite://other.db"

            [sources.wof]
            url = "https://example.org/wof.db.bz2"
            "#,
        )
        .unwrap();

        assert_eq!(config.global.database_url, "sqlite://other.db");
        assert_eq!(config.global.download_timeout_secs, 30);
        assert_eq!(config.global.cache_max_entries, 10_000);
        assert_eq!(
            config.source_url(GazetteerSource::Wof).as_deref(),
            Some("https://example.org/wof.db.bz2")
        );
        assert_eq!(
            config.source_url(GazetteerSource::Geonames).as_deref(),
            Some(DEFAULT_GEONAMES_URL)
        );
        assert!(config.source_url(GazetteerSource::Btaa).is_none());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazetteer.toml");
        fs::write(&path, "[sources.fast]\nurl = \"not a url\"\n").unwrap();

        assert!(Config::load_from_file(&path).is_err());
    }
}
