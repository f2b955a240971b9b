//! Gazetteer ingest pipeline.
//!
//! Optionally downloads the source files, imports each selected gazetteer
//! into SQLite and prints the import summary as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gazetteer::{import_sources, Config, GazetteerContext, GazetteerSource, ImportStatus};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Import gazetteer data into the local database")]
struct Args {
    /// Sources to import: geonames, wof, btaa, fast or all
    #[arg(long, num_args = 1.., default_value = "all")]
    sources: Vec<String>,

    /// Root data directory; each source reads from <data-dir>/<source>
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// SQLite database URL
    #[arg(long)]
    database_url: Option<String>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Download source files before importing
    #[arg(long)]
    download: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        config.global.database_url = url;
    }
    let data_dir = args
        .data_dir
        .unwrap_or_else(|| config.global.data_dir.clone());
    let sources = GazetteerSource::parse_list(&args.sources)?;

    info!("Gazetteer Ingest");
    info!(
        "Sources: {}",
        sources
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("Data directory: {}", data_dir.display());

    let ctx = GazetteerContext::connect(config)
        .await
        .context("Failed to open gazetteer database")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("importing");
    pb.enable_steady_tick(Duration::from_millis(120));

    let summary = import_sources(&ctx, &sources, &data_dir, args.download).await;
    pb.finish_and_clear();
    let summary = summary?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    ctx.close().await;

    if summary.status == ImportStatus::Error {
        anyhow::bail!("Every selected source failed to import");
    }
    Ok(())
}
