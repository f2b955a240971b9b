//! Key-value cache used by lookup and search.

use moka::sync::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Prefix shared by every gazetteer cache key. Import runs clear it.
pub const CACHE_PREFIX: &str = "gazetteer:";

pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Duration);
    /// Drop every entry whose key starts with `prefix`; returns how many.
    fn invalidate_prefix(&self, prefix: &str) -> usize;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Each entry lives for the ttl it was written with.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Bounded in-process cache with per-entry expiry.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }

    /// Live entries. Pending evictions are applied in batches, so this
    /// drains them until the count settles.
    pub fn len(&self) -> usize {
        let mut count = self.entries.entry_count();
        loop {
            self.entries.run_pending_tasks();
            let settled = self.entries.entry_count();
            if settled == count {
                return settled as usize;
            }
            count = settled;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(key.to_string(), Entry { value, ttl });
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<_> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.entries.invalidate(key.as_str());
        }
        keys.len()
    }
}

/// No-op cache for callers that want every query to hit the store.
pub struct NoCache;

impl KeyValueCache for NoCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: String, _ttl: Duration) {}

    fn invalidate_prefix(&self, _prefix: &str) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_unexpired_value() {
        let cache = MemoryCache::new(100);
        cache.set("gazetteer:lookup:a", "1".into(), Duration::from_secs(60));
        assert_eq!(cache.get("gazetteer:lookup:a").as_deref(), Some("1"));
        assert_eq!(cache.get("gazetteer:lookup:b"), None);
    }

    #[test]
    fn test_expired_entries_are_dropped_without_reads() {
        let cache = MemoryCache::new(100_000);
        for i in 0..2_000 {
            cache.set(&format!("gazetteer:k{i}"), "v".into(), Duration::from_millis(10));
        }
        // Expiry timers tick at roughly one second
        std::thread::sleep(Duration::from_millis(2_500));
        cache.set("gazetteer:fresh", "v".into(), Duration::from_secs(60));

        assert_eq!(cache.get("gazetteer:k0"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = MemoryCache::new(100);
        for i in 0..2_000 {
            cache.set(&format!("gazetteer:k{i}"), "v".into(), Duration::from_secs(60));
        }
        assert!(cache.len() <= 100);
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = MemoryCache::new(100);
        let ttl = Duration::from_secs(60);
        cache.set("gazetteer:lookup:x", "1".into(), ttl);
        cache.set("gazetteer:search:y", "2".into(), ttl);
        cache.set("other:z", "3".into(), ttl);

        assert_eq!(cache.invalidate_prefix(CACHE_PREFIX), 2);
        assert_eq!(cache.get("gazetteer:lookup:x"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("other:z").as_deref(), Some("3"));
    }
}
