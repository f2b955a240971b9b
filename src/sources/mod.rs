//! Downloaders for the gazetteers that publish archives.
//!
//! Each adapter fetches into its own directory under the data dir and skips
//! the download when its output is already present. BTAA ships as a CSV that
//! is dropped in place by hand, so it has no adapter.

pub mod fast;
pub mod geonames;
pub mod wof;

use reqwest::{Client, StatusCode};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub use fast::FastSource;
pub use geonames::GeonamesSource;
pub use wof::WofSource;

/// The gazetteers known to the importer and search layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GazetteerSource {
    Geonames,
    Wof,
    Btaa,
    Fast,
}

impl GazetteerSource {
    /// Import order used for `all`.
    pub const ALL: [GazetteerSource; 4] = [
        GazetteerSource::Geonames,
        GazetteerSource::Wof,
        GazetteerSource::Btaa,
        GazetteerSource::Fast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GazetteerSource::Geonames => "geonames",
            GazetteerSource::Wof => "wof",
            GazetteerSource::Btaa => "btaa",
            GazetteerSource::Fast => "fast",
        }
    }

    /// Directory name under the data dir.
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }

    /// Expand a list of names, where `all` selects every source.
    /// Duplicates are dropped; first occurrence wins.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>, UnknownSource> {
        let mut selected = Vec::new();
        for name in names {
            let name = name.as_ref();
            let expanded: Vec<Self> = if name.eq_ignore_ascii_case("all") {
                Self::ALL.to_vec()
            } else {
                vec![name.parse()?]
            };
            for source in expanded {
                if !selected.contains(&source) {
                    selected.push(source);
                }
            }
        }
        Ok(selected)
    }
}

impl fmt::Display for GazetteerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown gazetteer source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for GazetteerSource {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geonames" => Ok(GazetteerSource::Geonames),
            "wof" => Ok(GazetteerSource::Wof),
            "btaa" => Ok(GazetteerSource::Btaa),
            "fast" => Ok(GazetteerSource::Fast),
            _ => Err(UnknownSource(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive {archive} has no {wanted} member")]
    MissingEntry { archive: PathBuf, wanted: String },

    #[error("downloaded file {0} is empty")]
    Empty(PathBuf),

    #[error("export failed: {0}")]
    Export(#[from] sqlx::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }

    /// Connection failures, timeouts and 5xx responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network { source, .. } => source.is_connect() || source.is_timeout(),
            SourceError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// Last path segment of a URL, used as the local file name.
pub(crate) fn file_name_from_url(url: &str, fallback: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// `<dest>.part`, where `dest` is written until it is complete.
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Produce `dest` through its `.part` file, renamed into place only when
/// `write` succeeds. A failed write leaves nothing behind, so the
/// exists-checks in `download()` never see a truncated file.
pub(crate) fn write_atomically<T>(
    dest: &Path,
    write: impl FnOnce(&mut File) -> Result<T, SourceError>,
) -> Result<T, SourceError> {
    let partial = partial_path(dest);
    let result = File::create(&partial)
        .map_err(|e| SourceError::io(&partial, e))
        .and_then(|mut file| {
            let value = write(&mut file)?;
            file.sync_all().map_err(|e| SourceError::io(&partial, e))?;
            Ok(value)
        })
        .and_then(|value| {
            std::fs::rename(&partial, dest).map_err(|e| SourceError::io(dest, e))?;
            Ok(value)
        });

    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

/// Stream `url` into `dest` via its `.part` file.
pub async fn fetch_to_file(client: &Client, url: &str, dest: &Path) -> Result<u64, SourceError> {
    info!("Downloading {} -> {}", url, dest.display());

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SourceError::io(parent, e))?;
    }

    let partial = partial_path(dest);
    let written = match stream_body(client, url, &partial).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| SourceError::io(dest, e))?;

    debug!("Wrote {} bytes to {}", written, dest.display());
    Ok(written)
}

async fn stream_body(client: &Client, url: &str, partial: &Path) -> Result<u64, SourceError> {
    let network = |source: reqwest::Error| SourceError::Network {
        url: url.to_string(),
        source,
    };

    let mut response = client.get(url).send().await.map_err(network)?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status,
        });
    }

    let mut file = tokio::fs::File::create(partial)
        .await
        .map_err(|e| SourceError::io(partial, e))?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(network)? {
        file.write_all(&chunk)
            .await
            .map_err(|e| SourceError::io(partial, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| SourceError::io(partial, e))?;
    Ok(written)
}
