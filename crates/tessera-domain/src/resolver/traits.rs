//! The resolver seam.

use async_trait::async_trait;

use crate::error::DomainResult;

use super::types::{ResolveCheckRequest, ResolveCheckResponse};

/// A stage in the check resolution chain.
///
/// Every sub-check produced by rewrite expansion re-enters the chain
/// through its head, so stages compose: a cache in front of the evaluator
/// memoizes sub-problems of the same request tree as well as repeated
/// requests.
#[async_trait]
pub trait CheckResolver: Send + Sync {
    /// Resolves a check request to a definitive answer for the given
    /// (store, model, tuple key, overlays).
    async fn resolve_check(
        &self,
        req: ResolveCheckRequest,
    ) -> DomainResult<ResolveCheckResponse>;
}
