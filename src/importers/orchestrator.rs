//! Runs the selected source importers one after another and totals up the
//! results.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

use super::{
    BtaaImporter, FastImporter, GeonamesImporter, ImportResult, ImportStatus, WofImporter,
};
use crate::cache::CACHE_PREFIX;
use crate::context::GazetteerContext;
use crate::sources::fast::FastSource;
use crate::sources::{GazetteerSource, GeonamesSource, SourceError, WofSource};

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub status: ImportStatus,
    /// Sources in the order they ran
    pub sources: Vec<String>,
    pub results: BTreeMap<String, ImportResult>,
    pub total_records: usize,
    pub total_skipped: usize,
    pub total_errors: usize,
    /// Seconds
    pub elapsed_time: f64,
    pub records_per_second: f64,
}

impl ImportSummary {
    fn new(ran: Vec<(GazetteerSource, ImportResult)>, elapsed_time: f64) -> Self {
        let total_records = ran.iter().map(|(_, r)| r.records_processed).sum();
        let status = overall_status(ran.iter().map(|(_, r)| r.status));

        Self {
            status,
            sources: ran.iter().map(|(s, _)| s.to_string()).collect(),
            total_records,
            total_skipped: ran.iter().map(|(_, r)| r.records_skipped).sum(),
            total_errors: ran.iter().map(|(_, r)| r.error_count()).sum(),
            elapsed_time,
            records_per_second: if elapsed_time > 0.0 {
                total_records as f64 / elapsed_time
            } else {
                0.0
            },
            results: ran
                .into_iter()
                .map(|(s, r)| (s.to_string(), r))
                .collect(),
        }
    }
}

/// `error` only when every source failed.
pub(crate) fn overall_status(statuses: impl IntoIterator<Item = ImportStatus>) -> ImportStatus {
    let statuses: Vec<ImportStatus> = statuses.into_iter().collect();
    if statuses.is_empty() {
        return ImportStatus::Warning;
    }
    if statuses.iter().all(|s| *s == ImportStatus::Error) {
        ImportStatus::Error
    } else if statuses.iter().all(|s| *s == ImportStatus::Success) {
        ImportStatus::Success
    } else {
        ImportStatus::PartialSuccess
    }
}

/// Fetch a source's raw files into its directory. Existing files are kept.
pub async fn download_source(
    ctx: &GazetteerContext,
    source: GazetteerSource,
    dir: &Path,
) -> Result<(), SourceError> {
    let Some(url) = ctx.config.source_url(source) else {
        info!("{} has no download, expecting files in {}", source, dir.display());
        return Ok(());
    };

    match source {
        GazetteerSource::Geonames => {
            GeonamesSource::new(url, ctx.config.country_info_url(), dir.to_path_buf())
                .download(&ctx.http)
                .await?;
        }
        GazetteerSource::Wof => {
            let wof = WofSource::new(url, dir.to_path_buf());
            wof.download(&ctx.http).await?;
            wof.export().await?;
        }
        GazetteerSource::Fast => {
            FastSource::new(url, dir.to_path_buf())
                .download(&ctx.http)
                .await?;
        }
        GazetteerSource::Btaa => {}
    }
    Ok(())
}

pub async fn import_source(
    ctx: &GazetteerContext,
    source: GazetteerSource,
    dir: &Path,
) -> ImportResult {
    let store = ctx.store.clone();
    match source {
        GazetteerSource::Geonames => GeonamesImporter::new(store, dir).import_data().await,
        GazetteerSource::Wof => WofImporter::new(store, dir).import_data().await,
        GazetteerSource::Btaa => BtaaImporter::new(store, dir).import_data().await,
        GazetteerSource::Fast => FastImporter::new(store, dir).import_data().await,
    }
}

/// Import `sources` from `<data_dir>/<source>/`, optionally downloading
/// first. Download failures abort the run; import failures are reported in
/// the summary.
pub async fn import_sources(
    ctx: &GazetteerContext,
    sources: &[GazetteerSource],
    data_dir: &Path,
    download: bool,
) -> Result<ImportSummary> {
    let started = Instant::now();
    let mut ran = Vec::with_capacity(sources.len());

    for &source in sources {
        let dir = ctx.config.source_dir(data_dir, source);
        if download {
            info!("Downloading {} into {}", source, dir.display());
            download_source(ctx, source, &dir)
                .await
                .with_context(|| format!("Failed to download {}", source))?;
        }

        info!("Importing {} from {}", source, dir.display());
        let result = import_source(ctx, source, &dir).await;
        if result.status == ImportStatus::Error {
            error!(
                "{} import failed: {}",
                source,
                result.message.as_deref().unwrap_or("unknown error")
            );
        }
        ran.push((source, result));
    }

    let cleared = ctx.cache.invalidate_prefix(CACHE_PREFIX);
    if cleared > 0 {
        info!("Invalidated {} cached entries", cleared);
    }

    let summary = ImportSummary::new(ran, started.elapsed().as_secs_f64());
    info!(
        "Import finished with status {:?}: {} records in {:.2}s",
        summary.status, summary.total_records, summary.elapsed_time
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KeyValueCache;
    use crate::config::Config;
    use crate::store::GazetteerStore;
    use std::time::Duration;

    #[test]
    fn test_overall_status() {
        use ImportStatus::*;
        assert_eq!(overall_status([Success, Success]), Success);
        assert_eq!(overall_status([Success, Warning]), PartialSuccess);
        assert_eq!(overall_status([Error, Success]), PartialSuccess);
        assert_eq!(overall_status([Error, Error]), Error);
    }

    #[tokio::test]
    async fn test_import_sources_runs_in_order_and_clears_cache() {
        let data = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(data.path().join("btaa")).unwrap();
        std::fs::write(
            data.path().join("btaa/regions.csv"),
            "Fast,State Abbv,State Name\nMinnesota,MN,Minnesota\n",
        )
        .unwrap();

        let store = GazetteerStore::in_memory().await.unwrap();
        let ctx = GazetteerContext::with_store(Config::default(), store).unwrap();
        ctx.cache
            .set("gazetteer:search:x", "{}".into(), Duration::from_secs(60));

        let sources = [GazetteerSource::Btaa, GazetteerSource::Fast];
        let summary = import_sources(&ctx, &sources, data.path(), false)
            .await
            .unwrap();

        assert_eq!(summary.sources, vec!["btaa", "fast"]);
        assert_eq!(summary.results["btaa"].status, ImportStatus::Success);
        assert_eq!(summary.results["fast"].status, ImportStatus::Error);
        assert_eq!(summary.status, ImportStatus::PartialSuccess);
        assert_eq!(summary.total_records, 1);
        assert_eq!(ctx.cache.get("gazetteer:search:x"), None);
    }
}
