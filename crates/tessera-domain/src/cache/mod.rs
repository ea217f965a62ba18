//! Sub-problem cache with per-entry TTL.
//!
//! A bounded cache for check sub-problem results using Moka for
//! concurrent access with LRU-style eviction. Each entry carries its own
//! TTL; entries past their TTL are treated as absent. Freshness against a
//! caller's write fence (`last_cache_invalidation_time`) is the cached
//! resolver's concern, not the cache's.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;

use crate::resolver::ResolveCheckResponse;

/// Default maximum number of cached sub-problems.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 10_000;

/// Default TTL for a cached sub-problem.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Configuration for the sub-problem cache.
#[derive(Debug, Clone)]
pub struct CheckCacheConfig {
    /// Maximum number of entries; LRU eviction past this size.
    pub max_cache_size: u64,
    /// TTL applied to entries written by the cached resolver.
    pub cache_ttl: Duration,
}

impl Default for CheckCacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl CheckCacheConfig {
    /// Sets the maximum cache size.
    pub fn with_max_cache_size(mut self, max_cache_size: u64) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    /// Sets the entry TTL.
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }
}

/// A cached check response stamped with its write time.
///
/// The entry is valid for a caller iff
/// `last_modified > req.last_cache_invalidation_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResponseCacheEntry {
    /// When the entry was written.
    pub last_modified: DateTime<Utc>,
    /// The cached response.
    pub response: ResolveCheckResponse,
}

#[derive(Debug)]
struct StoredEntry {
    entry: CheckResponseCacheEntry,
    ttl: Duration,
}

/// Expires each entry after its own TTL.
struct PerEntryExpiry;

impl Expiry<String, Arc<StoredEntry>> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<StoredEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded sub-problem cache keyed by request fingerprint.
///
/// # Thread Safety
///
/// Fully thread-safe; shared across async tasks without external
/// synchronization.
pub struct CheckCache {
    cache: Cache<String, Arc<StoredEntry>>,
}

impl std::fmt::Debug for CheckCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl CheckCache {
    /// Creates a cache bounded to `max_cache_size` entries.
    pub fn new(max_cache_size: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_cache_size)
            .expire_after(PerEntryExpiry)
            .build();
        Self { cache }
    }

    /// Retrieves a cached entry, refreshing its recency.
    ///
    /// Returns `None` if the key is absent or the entry's TTL elapsed.
    pub async fn get(&self, key: &str) -> Option<CheckResponseCacheEntry> {
        self.cache.get(key).await.map(|stored| stored.entry.clone())
    }

    /// Stores an entry under the given TTL, evicting LRU entries when at
    /// capacity.
    pub async fn set(&self, key: String, entry: CheckResponseCacheEntry, ttl: Duration) {
        self.cache
            .insert(key, Arc::new(StoredEntry { entry, ttl }))
            .await;
    }

    /// Releases the cache's contents and pending maintenance work.
    pub fn stop(&self) {
        self.cache.invalidate_all();
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance tasks. Useful for testing TTL behavior.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}
