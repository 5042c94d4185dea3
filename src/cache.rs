// Cache store boundary and the in-memory TTL store used by default.
// The query service treats the store as an atomic key/value service: every
// write is a full overwrite, and expiry is the only deletion path it relies on.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::Instant;

use crate::model::SearchCriteria;

pub const CACHE_KEY_NAMESPACE: &str = "flight:search:";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache rejected {key} ({size_bytes} bytes exceeds capacity)")]
    Rejected { key: String, size_bytes: usize },
}

/// Key/value store the query service reads and writes serialized results through.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    // Overwrite `key` with `value`, expiring `ttl` from now
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    // Ok(None) for both a missing and an expired entry
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    // Returns whether an entry was removed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Deterministic key for a search: a namespace tag followed by the first 16
/// bytes of a SHA-256 over the ordered search fields, hex encoded.
pub fn cache_key(criteria: &SearchCriteria) -> String {
    let return_date = criteria
        .return_date
        .map(|d| d.to_string())
        .unwrap_or_default();

    let material = format!(
        "{}|{}|{}|{}|{}|{}",
        criteria.origin.to_ascii_uppercase(),
        criteria.destination.to_ascii_uppercase(),
        criteria.departure_date,
        return_date,
        criteria.passengers,
        criteria.cabin_class.as_str(),
    );

    let digest = Sha256::digest(material.as_bytes());
    format!("{}{}", CACHE_KEY_NAMESPACE, hex::encode(&digest[..16]))
}

pub fn calculate_item_size(key: &str, value: &str) -> usize {
    key.len() + value.len() + std::mem::size_of::<Instant>()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size_bytes: usize,
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
    pub rejected_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size_mb: usize,
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 100,
            default_ttl_seconds: 15 * 60,
        }
    }
}

impl CacheConfig {
    // None when the megabyte count does not fit in a byte count
    pub fn max_size_bytes(&self) -> Option<usize> {
        megabytes(self.max_size_mb)
    }
}

fn megabytes(mb: usize) -> Option<usize> {
    mb.checked_mul(1024 * 1024)
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL store. Entries live in a `DashMap`; an expiry index ordered
/// by deadline drives purging and capacity eviction (soonest-expiring first).
pub struct TtlCache {
    store: DashMap<String, CacheEntry>,
    expiry_index: Mutex<BTreeMap<Instant, HashSet<String>>>,
    max_size_bytes: AtomicUsize,
    default_ttl: Duration,
    cache_stats: Arc<RwLock<CacheStats>>,
}

impl TtlCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: DashMap::new(),
            expiry_index: Mutex::new(BTreeMap::new()),
            max_size_bytes: AtomicUsize::new(config.max_size_bytes().unwrap_or(usize::MAX)),
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            cache_stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    // Returns false when the item alone is larger than the whole cache
    pub fn store(&self, key: &str, value: String, ttl: Option<Duration>) -> bool {
        let size = calculate_item_size(key, &value);
        let max_size = self.max_size_bytes.load(Ordering::SeqCst);

        if size > max_size {
            self.cache_stats.write().rejected_count += 1;
            return false;
        }

        let now = Instant::now();
        let expires_at = now + ttl.unwrap_or(self.default_ttl);

        let mut index = self.expiry_index.lock();
        self.purge_expired(&mut index, now);

        if let Some((old_key, old)) = self.store.remove(key) {
            self.unlink(&mut index, &old_key, &old);
        }

        while self.cache_stats.read().size_bytes + size > max_size {
            if !self.evict_soonest(&mut index) {
                break;
            }
        }

        index
            .entry(expires_at)
            .or_insert_with(HashSet::new)
            .insert(key.to_string());
        self.store
            .insert(key.to_string(), CacheEntry { value, expires_at });

        let mut stats = self.cache_stats.write();
        stats.items_count += 1;
        stats.size_bytes += size;

        true
    }

    pub fn fetch(&self, key: &str) -> Option<String> {
        let now = Instant::now();

        let live = self.store.get(key).map(|entry| {
            if entry.expires_at > now {
                Some(entry.value.clone())
            } else {
                None
            }
        });

        match live {
            Some(Some(value)) => {
                self.cache_stats.write().hit_count += 1;
                Some(value)
            }
            Some(None) => {
                let mut index = self.expiry_index.lock();
                if let Some((k, old)) = self.store.remove_if(key, |_, e| e.expires_at <= now) {
                    self.unlink(&mut index, &k, &old);
                    self.cache_stats.write().expired_count += 1;
                }
                self.cache_stats.write().miss_count += 1;
                None
            }
            None => {
                self.cache_stats.write().miss_count += 1;
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut index = self.expiry_index.lock();
        match self.store.remove(key) {
            Some((k, old)) => {
                self.unlink(&mut index, &k, &old);
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache_stats.read().clone()
    }

    // Resize the cache, evicting soonest-expiring entries when shrinking.
    // Refuses sizes that overflow a byte count.
    pub fn resize(&self, new_max_size_mb: usize) -> bool {
        let Some(new_max) = megabytes(new_max_size_mb) else {
            return false;
        };
        self.max_size_bytes.store(new_max, Ordering::SeqCst);

        let mut index = self.expiry_index.lock();
        self.purge_expired(&mut index, Instant::now());

        while self.cache_stats.read().size_bytes > new_max {
            if !self.evict_soonest(&mut index) {
                break;
            }
        }

        true
    }

    fn unlink(
        &self,
        index: &mut BTreeMap<Instant, HashSet<String>>,
        key: &str,
        entry: &CacheEntry,
    ) {
        if let Some(keys) = index.get_mut(&entry.expires_at) {
            keys.remove(key);
            if keys.is_empty() {
                index.remove(&entry.expires_at);
            }
        }

        let mut stats = self.cache_stats.write();
        stats.items_count = stats.items_count.saturating_sub(1);
        stats.size_bytes = stats
            .size_bytes
            .saturating_sub(calculate_item_size(key, &entry.value));
    }

    fn purge_expired(&self, index: &mut BTreeMap<Instant, HashSet<String>>, now: Instant) {
        loop {
            let due = match index.first_key_value() {
                Some((expires_at, _)) if *expires_at <= now => *expires_at,
                _ => break,
            };

            if let Some(keys) = index.remove(&due) {
                for key in keys {
                    if let Some((k, old)) = self.store.remove(&key) {
                        let mut stats = self.cache_stats.write();
                        stats.expired_count += 1;
                        stats.items_count = stats.items_count.saturating_sub(1);
                        stats.size_bytes = stats
                            .size_bytes
                            .saturating_sub(calculate_item_size(&k, &old.value));
                    }
                }
            }
        }
    }

    fn evict_soonest(&self, index: &mut BTreeMap<Instant, HashSet<String>>) -> bool {
        let victim = index
            .first_key_value()
            .and_then(|(_, keys)| keys.iter().next().cloned());

        match victim {
            Some(key) => {
                if let Some((k, old)) = self.store.remove(&key) {
                    self.unlink(index, &k, &old);
                } else if let Some((expires_at, _)) = index.first_key_value() {
                    // Stale index entry, drop it so the loop makes progress
                    let expires_at = *expires_at;
                    index.remove(&expires_at);
                }
                self.cache_stats.write().eviction_count += 1;
                true
            }
            None => false,
        }
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for TtlCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let size_bytes = calculate_item_size(key, &value);
        if self.store(key, value, Some(ttl)) {
            Ok(())
        } else {
            Err(CacheError::Rejected {
                key: key.to_string(),
                size_bytes,
            })
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.fetch(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.remove(key))
    }
}
