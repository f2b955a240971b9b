//! Process-wide dependencies, created once at startup and passed explicitly.

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;

use crate::cache::{KeyValueCache, MemoryCache};
use crate::config::Config;
use crate::lookup::GazetteerService;
use crate::search::SearchEngine;
use crate::store::GazetteerStore;

#[derive(Clone)]
pub struct GazetteerContext {
    pub config: Config,
    pub store: GazetteerStore,
    pub cache: Arc<dyn KeyValueCache>,
    pub http: Client,
}

impl GazetteerContext {
    /// Open the configured database and build the shared HTTP client.
    pub async fn connect(config: Config) -> Result<Self> {
        let store = GazetteerStore::connect(&config.global.database_url).await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: GazetteerStore) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("gazetteer/", env!("CARGO_PKG_VERSION")))
            .timeout(config.download_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let cache = Arc::new(MemoryCache::new(config.global.cache_max_entries));

        Ok(Self {
            config,
            store,
            cache,
            http,
        })
    }

    pub fn lookup(&self) -> GazetteerService {
        GazetteerService::new(self.store.clone(), self.cache.clone(), self.config.cache_ttl())
    }

    pub fn search(&self) -> SearchEngine {
        SearchEngine::new(self.store.clone(), self.cache.clone(), self.config.cache_ttl())
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
