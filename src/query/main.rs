//! Gazetteer query tool.
//!
//! Place lookup, per-gazetteer search and aggregated search against the
//! local database. Every command prints JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gazetteer::search::{BtaaFilter, GeonamesFilter, Page, SearchRequest, WofFilter};
use gazetteer::{Config, GazetteerContext};

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Look up and search imported gazetteers")]
struct Args {
    /// SQLite database URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Clone, Copy)]
struct PageArgs {
    /// Result offset for pagination
    #[arg(long, default_value = "0")]
    offset: u32,

    /// Maximum number of results
    #[arg(long, default_value = "20")]
    limit: u32,
}

impl From<PageArgs> for Page {
    fn from(args: PageArgs) -> Self {
        Page {
            offset: args.offset,
            limit: args.limit,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a place name to its best GeoNames match
    Lookup {
        name: String,
        /// e.g. city, river, mountain
        #[arg(long = "type")]
        entity_type: Option<String>,
        /// Free-text context, logged only
        #[arg(long)]
        context: Option<String>,
    },
    /// Search GeoNames, WOF and BTAA together
    Search {
        q: Option<String>,
        /// geonames, wof, btaa or all
        #[arg(long)]
        gazetteer: Option<String>,
        #[arg(long)]
        country_code: Option<String>,
        #[arg(long)]
        state_abbv: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Search GeoNames
    Geonames {
        q: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        country_code: Option<String>,
        #[arg(long)]
        feature_class: Option<String>,
        #[arg(long)]
        feature_code: Option<String>,
        #[arg(long)]
        admin1_code: Option<String>,
        #[arg(long)]
        admin2_code: Option<String>,
        #[arg(long)]
        population_min: Option<i64>,
        #[arg(long)]
        population_max: Option<i64>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Search Who's On First places
    Wof {
        q: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        placetype: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        is_current: Option<bool>,
        #[arg(long)]
        parent_id: Option<i64>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Search BTAA regions
    Btaa {
        q: Option<String>,
        #[arg(long)]
        fast_area: Option<String>,
        #[arg(long)]
        state_abbv: Option<String>,
        #[arg(long)]
        county_fips: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// List gazetteers with record counts
    Gazetteers,
    /// Show a WOF place with its ancestors, names, concordances and geometry
    WofDetail { wok_id: i64 },
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        config.global.database_url = url;
    }
    let ctx = GazetteerContext::connect(config)
        .await
        .context("Failed to open gazetteer database")?;

    let outcome = run(&ctx, args.command).await;
    ctx.close().await;
    outcome
}

async fn run(ctx: &GazetteerContext, command: Command) -> Result<()> {
    let search = ctx.search();

    match command {
        Command::Lookup {
            name,
            entity_type,
            context,
        } => {
            let result = ctx
                .lookup()
                .lookup_place(&name, entity_type.as_deref(), context.as_deref())
                .await?;
            if result.is_none() {
                tracing::warn!("No place found for {:?}", name);
            }
            print(&result)
        }
        Command::Search {
            q,
            gazetteer,
            country_code,
            state_abbv,
            page,
        } => {
            let request = SearchRequest {
                q,
                gazetteer,
                country_code,
                state_abbv,
                page: page.into(),
            };
            print(&search.search_gazetteers(&request).await?)
        }
        Command::Geonames {
            q,
            name,
            country_code,
            feature_class,
            feature_code,
            admin1_code,
            admin2_code,
            population_min,
            population_max,
            page,
        } => {
            let filter = GeonamesFilter {
                q,
                name,
                country_code,
                feature_class,
                feature_code,
                admin1_code,
                admin2_code,
                population_min,
                population_max,
            };
            print(&search.search_geonames(&filter, page.into()).await?)
        }
        Command::Wof {
            q,
            name,
            placetype,
            country,
            is_current,
            parent_id,
            page,
        } => {
            let filter = WofFilter {
                q,
                name,
                placetype,
                country,
                is_current,
                parent_id,
            };
            print(&search.search_wof(&filter, page.into()).await?)
        }
        Command::Btaa {
            q,
            fast_area,
            state_abbv,
            county_fips,
            page,
        } => {
            let filter = BtaaFilter {
                q,
                fast_area,
                state_abbv,
                county_fips,
            };
            print(&search.search_btaa(&filter, page.into()).await?)
        }
        Command::Gazetteers => print(&search.list_gazetteers().await?),
        Command::WofDetail { wok_id } => match search.wof_details(wok_id).await? {
            Some(details) => print(&details),
            None => anyhow::bail!("WOF place {} not found", wok_id),
        },
    }
}
