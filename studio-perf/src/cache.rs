use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// Configuration for the cache system
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries
    pub max_size: usize,
    /// How long an entry stays valid after it was last written
    #[serde(rename = "ttl_ms", with = "crate::config::duration_ms")]
    pub ttl: Duration,
    /// Whether caching is enabled
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl: Duration::from_secs(5 * 60),
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size,
            ttl,
            enabled: true,
        }
    }
}

/// Cached value with the time it was written
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_valid(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() <= ttl
    }
}

/// Build a stable cache key from ordered parts.
///
/// Parts are hashed with SHA-256 so arbitrary query parameters collapse into
/// a fixed-width hex string usable with both [`LruCache`] and the request
/// deduplicator.
pub fn cache_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let part = part.as_ref();
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Bounded in-memory cache combining least-recently-used eviction with
/// absolute expiry.
///
/// A read moves the entry to the most recently used position; a write stamps
/// it with the current time. Entries older than the configured TTL are never
/// returned and are dropped when a read finds them.
pub struct LruCache<K, V>
where
    K: Hash + Eq,
{
    entries: Mutex<lru::LruCache<K, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    pub config: CacheConfig,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            config,
        }
    }

    pub fn with_capacity(max_size: usize, ttl: Duration) -> Self {
        Self::new(CacheConfig::new(max_size, ttl))
    }

    /// Get the cached value if present and not expired
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.config.enabled {
            return None;
        }

        let mut entries = self.entries.lock();
        let expired = match entries.peek(key) {
            Some(entry) => !entry.is_valid(self.config.ttl),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            log::debug!("Cache entry expired");
            entries.pop(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store a value, replacing any previous entry for the key
    pub fn set(&self, key: K, value: V) {
        if !self.config.enabled {
            return;
        }

        let mut entries = self.entries.lock();
        let evicting = entries.len() >= entries.cap().get() && !entries.contains(&key);
        entries.put(key, CacheEntry::new(value));

        if evicting {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!("Evicted least recently used cache entry");
        }
    }

    /// Existence check honoring expiry; does not change recency
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.config.enabled {
            return false;
        }

        self.entries
            .lock()
            .peek(key)
            .is_some_and(|entry| entry.is_valid(self.config.ttl))
    }

    /// Remove an entry, returning whether one was present
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().pop(key).is_some()
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.entries.lock().clear();
        log::info!("Cache cleared");
    }

    /// Number of stored entries, expired ones included until they are swept
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Remove expired entries from cache
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let ttl = self.config.ttl;

        // No retain on lru: drain from the cold end, then re-insert the
        // survivors oldest first so their recency order is unchanged.
        let mut expired = 0;
        let mut kept = Vec::with_capacity(entries.len());
        while let Some((key, entry)) = entries.pop_lru() {
            if entry.is_valid(ttl) {
                kept.push((key, entry));
            } else {
                expired += 1;
            }
        }
        for (key, entry) in kept {
            entries.put(key, entry);
        }

        log::debug!("Evicted {} expired cache entries", expired);
        expired
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let total_entries = entries.len();
        let expired_entries = entries
            .iter()
            .filter(|(_, entry)| !entry.is_valid(self.config.ttl))
            .count();

        CacheStats {
            total_entries,
            valid_entries: total_entries - expired_entries,
            expired_entries,
            max_entries: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Thread-safe wrapper for the cache
pub type SharedLruCache<K, V> = Arc<LruCache<K, V>>;
