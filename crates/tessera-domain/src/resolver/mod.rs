//! Check resolution engine.
//!
//! The resolver decomposes a check over the authorization model's rewrite
//! expressions and answers "does user U have relation R on object O".
//!
//! # Architecture
//!
//! - **Chain of stages**: `CachedCheckResolver` fronts `LocalChecker`;
//!   every sub-check re-enters through the chain head so sub-problems are
//!   memoized within a request tree and across requests.
//! - **Parallel combinators**: union, intersection, and difference fan
//!   their children out with `FuturesUnordered`; the first decisive
//!   outcome cancels the scope shared by in-flight siblings.
//! - **Depth bound**: recursion depth is carried in the request and
//!   capped (default 25); cycles in the relation graph terminate with
//!   `ResolutionDepthExceeded` instead of looping.

mod cached;
mod chain;
mod contextual;
mod keys;
mod local;
mod traits;
mod types;

#[cfg(test)]
mod tests;

pub use cached::{register_check_resolver_metrics, CacheStats, CachedCheckResolver};
pub use chain::build_check_resolver;
pub use keys::{check_request_cache_key, SUBPROBLEM_CACHE_PREFIX};
pub use local::{
    LocalChecker, LocalCheckerConfig, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_RESOLUTION_DEPTH_LIMIT,
};
pub use traits::CheckResolver;
pub use types::{
    ConsistencyPreference, RequestMetadata, ResolutionMetadata, ResolveCheckRequest,
    ResolveCheckResponse,
};
