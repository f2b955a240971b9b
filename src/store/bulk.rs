//! Chunked table loads.
//!
//! A load replaces the whole table: opening a [`TableLoader`] deletes every
//! row, then records are buffered and written in fixed-size chunks. Each
//! chunk commits in its own transaction, so a failure keeps the chunks that
//! were already written.

use anyhow::{Context, Result};
use sqlx::query_builder::Separated;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::time::Duration;
use tracing::{debug, info};

use super::GazetteerStore;

/// SQLite's default ceiling on bound parameters per statement.
pub const MAX_BIND_PARAMS: usize = 32_766;

pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// A record type that maps onto one gazetteer table.
pub trait GazetteerTable: Send + Sync {
    const TABLE: &'static str;
    /// Insert columns, in `bind_row` order.
    const COLUMNS: &'static [&'static str];
    /// Unique key. Non-empty keys turn chunk inserts into upserts.
    const CONFLICT_KEY: &'static [&'static str] = &[];

    fn bind_row<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>);
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub chunk_size: usize,
    /// Pause between chunks, never after the last one
    pub delay: Option<Duration>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_written: usize,
    pub chunks: usize,
}

/// Largest chunk that keeps one statement under [`MAX_BIND_PARAMS`].
pub fn effective_chunk_size(requested: usize, columns: usize) -> usize {
    let cap = MAX_BIND_PARAMS / columns.max(1);
    requested.min(cap).max(1)
}

/// Write one chunk in its own transaction.
async fn write_chunk<T: GazetteerTable>(
    pool: &SqlitePool,
    records: &[T],
    conflict_key: &[&str],
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        T::TABLE,
        T::COLUMNS.join(", ")
    ));
    qb.push_values(records, |mut row, record| record.bind_row(&mut row));

    if !conflict_key.is_empty() {
        let updates: Vec<String> = T::COLUMNS
            .iter()
            .filter(|c| !conflict_key.contains(*c) && **c != "created_at")
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        qb.push(format!(" ON CONFLICT({}) ", conflict_key.join(", ")));
        if updates.is_empty() {
            qb.push("DO NOTHING");
        } else {
            qb.push("DO UPDATE SET ");
            qb.push(updates.join(", "));
        }
    }

    let mut tx = pool.begin().await?;
    qb.build()
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to write {} rows to {}", records.len(), T::TABLE))?;
    tx.commit().await?;
    Ok(())
}

/// Buffered writer for a table opened with [`GazetteerStore::replace_all`].
pub struct TableLoader<T: GazetteerTable> {
    pool: SqlitePool,
    chunk_size: usize,
    delay: Option<Duration>,
    buffer: Vec<T>,
    stats: LoadStats,
}

impl<T: GazetteerTable> TableLoader<T> {
    /// Add a record, flushing if the chunk is full
    pub async fn add(&mut self, record: T) -> Result<()> {
        self.buffer.push(record);

        if self.buffer.len() >= self.chunk_size {
            self.flush().await?;
        }

        Ok(())
    }

    pub async fn extend<I: IntoIterator<Item = T>>(&mut self, records: I) -> Result<()> {
        for record in records {
            self.add(record).await?;
        }
        Ok(())
    }

    /// Write whatever is buffered as one chunk.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if self.stats.chunks > 0 {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }

        let rows = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        debug!("Writing chunk of {} rows to {}", rows.len(), T::TABLE);
        write_chunk(&self.pool, &rows, T::CONFLICT_KEY).await?;

        self.stats.rows_written += rows.len();
        self.stats.chunks += 1;
        Ok(())
    }

    /// Flush the tail and return statistics
    pub async fn finish(mut self) -> Result<LoadStats> {
        self.flush().await?;
        info!(
            "Loaded {} rows into {} in {} chunk(s)",
            self.stats.rows_written,
            T::TABLE,
            self.stats.chunks
        );
        Ok(self.stats)
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl GazetteerStore {
    /// Empty `T::TABLE` and return a loader for its new contents.
    pub async fn replace_all<T: GazetteerTable>(&self, options: LoadOptions) -> Result<TableLoader<T>> {
        let mut tx = self.pool().begin().await?;
        let deleted = sqlx::query(&format!("DELETE FROM {}", T::TABLE))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to clear {}", T::TABLE))?
            .rows_affected();
        // Surrogate ids restart at 1 so a reload reproduces the same rows
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
            .bind(T::TABLE)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to reset id sequence of {}", T::TABLE))?;
        tx.commit().await?;
        debug!("Cleared {} rows from {}", deleted, T::TABLE);

        let chunk_size = effective_chunk_size(options.chunk_size, T::COLUMNS.len());
        Ok(TableLoader {
            pool: self.pool().clone(),
            chunk_size,
            delay: options.delay,
            buffer: Vec::with_capacity(chunk_size),
            stats: LoadStats::default(),
        })
    }

    /// Insert or update `records` keyed on `constraint_columns`, in chunks.
    pub async fn upsert<T: GazetteerTable>(
        &self,
        records: &[T],
        constraint_columns: &[&str],
    ) -> Result<LoadStats> {
        let chunk_size = effective_chunk_size(DEFAULT_CHUNK_SIZE, T::COLUMNS.len());
        let mut stats = LoadStats::default();
        for chunk in records.chunks(chunk_size) {
            write_chunk(self.pool(), chunk, constraint_columns).await?;
            stats.rows_written += chunk.len();
            stats.chunks += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BtaaRegion, GeonamesRecord};
    use crate::testing::{btaa_region, geonames_record};

    #[tokio::test]
    async fn test_reload_keeps_surrogate_ids() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut loader = store
                .replace_all::<BtaaRegion>(LoadOptions::default())
                .await
                .unwrap();
            loader
                .extend([btaa_region("Minnesota", "MN"), btaa_region("Wisconsin", "WI")])
                .await
                .unwrap();
            loader.finish().await.unwrap();

            let rows: Vec<(i64, String)> =
                sqlx::query_as("SELECT id, fast_area FROM gazetteer_btaa ORDER BY id")
                    .fetch_all(store.pool())
                    .await
                    .unwrap();
            runs.push(rows);
        }

        assert_eq!(
            runs[0],
            vec![(1, "Minnesota".to_string()), (2, "Wisconsin".to_string())]
        );
        assert_eq!(runs[0], runs[1]);
    }

    #[test]
    fn test_chunk_size_capped_by_parameter_limit() {
        assert_eq!(effective_chunk_size(5000, 21), 1560);
        assert_eq!(effective_chunk_size(1000, 9), 1000);
        assert_eq!(effective_chunk_size(0, 9), 1);
    }

    #[tokio::test]
    async fn test_replace_all_writes_in_chunks() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut loader = store
            .replace_all::<GeonamesRecord>(LoadOptions {
                chunk_size: 2,
                delay: None,
            })
            .await
            .unwrap();
        loader
            .extend((1..=5).map(|id| geonames_record(id, &format!("Place {id}"), Some(id * 10))))
            .await
            .unwrap();
        let stats = loader.finish().await.unwrap();

        assert_eq!(stats, LoadStats { rows_written: 5, chunks: 3 });
        assert_eq!(store.table_count(GeonamesRecord::TABLE).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_replace_all_discards_previous_rows() {
        let store = GazetteerStore::in_memory().await.unwrap();
        for names in [vec!["Minnesota", "Wisconsin"], vec!["Iowa"]] {
            let mut loader = store
                .replace_all::<BtaaRegion>(LoadOptions::default())
                .await
                .unwrap();
            loader
                .extend(names.into_iter().map(|n| btaa_region(n, "MN")))
                .await
                .unwrap();
            loader.finish().await.unwrap();
        }

        let names: Vec<String> = sqlx::query_scalar("SELECT fast_area FROM gazetteer_btaa")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(names, vec!["Iowa".to_string()]);

        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM gazetteer_btaa")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_duplicate_keys_collapse_to_last_row() {
        let store = GazetteerStore::in_memory().await.unwrap();
        let mut loader = store
            .replace_all::<GeonamesRecord>(LoadOptions::default())
            .await
            .unwrap();
        loader.add(geonames_record(7, "Old", None)).await.unwrap();
        loader.add(geonames_record(7, "New", Some(3))).await.unwrap();
        loader.finish().await.unwrap();

        let (name, population): (String, Option<i64>) =
            sqlx::query_as("SELECT name, population FROM gazetteer_geonames WHERE geonameid = 7")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(name, "New");
        assert_eq!(population, Some(3));
    }

    #[tokio::test]
    async fn test_standalone_upsert_updates_existing() {
        let store = GazetteerStore::in_memory().await.unwrap();
        store
            .upsert(&[geonames_record(1, "Saint Paul", Some(300_000))], &["geonameid"])
            .await
            .unwrap();
        store
            .upsert(&[geonames_record(1, "St. Paul", Some(311_000))], &["geonameid"])
            .await
            .unwrap();

        let stored: GeonamesRecord =
            sqlx::query_as("SELECT * FROM gazetteer_geonames WHERE geonameid = 1")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(stored.name, "St. Paul");
        assert_eq!(stored.population, Some(311_000));
    }
}
