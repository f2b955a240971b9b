//! Gazetteer - multi-source place name ingestion, resolution and search
//!
//! Imports GeoNames, Who's On First, BTAA and OCLC FAST into SQLite and
//! serves the `ingest` and `query` binaries.

pub mod cache;
pub mod config;
pub mod context;
pub mod importers;
pub mod lookup;
pub mod models;
pub mod search;
pub mod sources;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use context::GazetteerContext;
pub use importers::{import_sources, ImportResult, ImportStatus, ImportSummary};
pub use lookup::GazetteerService;
pub use models::{GeonamesRecord, LookupResult};
pub use search::{SearchEngine, SearchError, SearchRequest, SearchResponse};
pub use sources::GazetteerSource;
pub use store::GazetteerStore;
