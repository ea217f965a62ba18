//! Resolver chain wiring.

use std::sync::Arc;

use tessera_storage::TupleReader;

use crate::cache::CheckCacheConfig;
use crate::model::ModelReader;

use super::cached::CachedCheckResolver;
use super::local::{LocalChecker, LocalCheckerConfig};
use super::traits::CheckResolver;

/// Builds the standard two-stage resolver chain: a cached resolver in
/// front of the local evaluator, with the evaluator's sub-checks
/// re-entering through the cache.
///
/// The evaluator holds the chain head weakly, so dropping the returned
/// resolver tears the whole chain down.
pub fn build_check_resolver(
    datastore: Arc<dyn TupleReader>,
    models: Arc<dyn ModelReader>,
    checker_config: LocalCheckerConfig,
    cache_config: CheckCacheConfig,
) -> Arc<CachedCheckResolver> {
    let local = Arc::new(LocalChecker::with_config(datastore, models, checker_config));
    let cached = Arc::new(CachedCheckResolver::new(
        Arc::clone(&local) as Arc<dyn CheckResolver>,
        cache_config,
    ));
    let head: Arc<dyn CheckResolver> = Arc::clone(&cached) as Arc<dyn CheckResolver>;
    local.set_delegate(Arc::downgrade(&head));
    cached
}
