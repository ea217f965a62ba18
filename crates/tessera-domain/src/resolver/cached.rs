//! Cache-fronted check resolution.
//!
//! `CachedCheckResolver` attempts to resolve check sub-problems from
//! prior computations before delegating to the underlying resolver. An
//! entry is served only when it is younger than the caller's
//! `last_cache_invalidation_time` write fence, and never when the caller
//! asked for `HigherConsistency`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;

use crate::cache::{CheckCache, CheckCacheConfig, CheckResponseCacheEntry};
use crate::error::DomainResult;

use super::keys::check_request_cache_key;
use super::traits::CheckResolver;
use super::types::{ConsistencyPreference, ResolveCheckRequest, ResolveCheckResponse};

/// Readable cache counters, mirroring the exported metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cache-eligible resolve calls.
    pub total: u64,
    /// Fresh hits served from the cache.
    pub hits: u64,
}

/// A resolver stage that memoizes sub-problem results.
pub struct CachedCheckResolver {
    delegate: RwLock<Arc<dyn CheckResolver>>,
    cache: Arc<CheckCache>,
    cache_ttl: Duration,
    /// Whether the cache was allocated by this resolver. Only an owned
    /// cache is stopped on `close`.
    owns_cache: bool,
    total_count: AtomicU64,
    hit_count: AtomicU64,
}

impl CachedCheckResolver {
    /// Creates a resolver that owns its cache.
    pub fn new(delegate: Arc<dyn CheckResolver>, config: CheckCacheConfig) -> Self {
        Self {
            delegate: RwLock::new(delegate),
            cache: Arc::new(CheckCache::new(config.max_cache_size)),
            cache_ttl: config.cache_ttl,
            owns_cache: true,
            total_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
        }
    }

    /// Creates a resolver over an externally managed cache. The cache is
    /// not stopped on `close`; its lifecycle belongs to the caller.
    pub fn with_existing_cache(
        delegate: Arc<dyn CheckResolver>,
        cache: Arc<CheckCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            delegate: RwLock::new(delegate),
            cache,
            cache_ttl,
            owns_cache: false,
            total_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
        }
    }

    /// Rebinds the dispatch delegate.
    pub fn set_delegate(&self, delegate: Arc<dyn CheckResolver>) {
        *self
            .delegate
            .write()
            .unwrap_or_else(PoisonError::into_inner) = delegate;
    }

    /// Returns the dispatch delegate.
    pub fn get_delegate(&self) -> Arc<dyn CheckResolver> {
        Arc::clone(
            &self
                .delegate
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Returns the cache this resolver reads through.
    pub fn cache(&self) -> &Arc<CheckCache> {
        &self.cache
    }

    /// Returns current hit/total counters.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            total: self.total_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
        }
    }

    /// Releases resources allocated by this resolver. An externally
    /// provided cache is left running.
    pub fn close(&self) {
        if self.owns_cache {
            self.cache.stop();
        }
    }
}

#[async_trait]
impl CheckResolver for CachedCheckResolver {
    #[instrument(
        name = "resolve_check",
        skip_all,
        fields(
            object = %req.tuple_key.object,
            relation = %req.tuple_key.relation,
            cached = tracing::field::Empty,
        )
    )]
    async fn resolve_check(&self, req: ResolveCheckRequest) -> DomainResult<ResolveCheckResponse> {
        let cache_key = match check_request_cache_key(&req) {
            Ok(key) => key,
            Err(err) => {
                tracing::error!(error = %err, "cache key computation failed");
                return Err(err);
            }
        };

        let try_cache = req.consistency != ConsistencyPreference::HigherConsistency;
        if try_cache {
            self.total_count.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("check_cache_total_count").increment(1);
            if let Some(entry) = self.cache.get(&cache_key).await {
                let is_valid = entry.last_modified > req.last_cache_invalidation_time;
                tracing::Span::current().record("cached", is_valid);
                if is_valid {
                    self.hit_count.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("check_cache_hit_count").increment(1);
                    // a copy, never the stored entry itself
                    return Ok(entry.response);
                }
            }
        }

        let response = match self.get_delegate().resolve_check(req).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "check resolution failed");
                return Err(err);
            }
        };

        self.cache
            .set(
                cache_key,
                CheckResponseCacheEntry {
                    last_modified: Utc::now(),
                    response: response.clone(),
                },
                self.cache_ttl,
            )
            .await;
        Ok(response)
    }
}

/// Registers metric descriptions for the cached resolver.
///
/// Call once during application startup; optional, but gives the
/// counters help text in the metrics exporter.
pub fn register_check_resolver_metrics() {
    metrics::describe_counter!(
        "check_cache_total_count",
        "The total number of calls to resolve_check."
    );
    metrics::describe_counter!(
        "check_cache_hit_count",
        "The total number of cache hits for resolve_check."
    );
}
