//! The local check evaluator.
//!
//! `LocalChecker` decomposes a check over the authorization model's
//! rewrite expressions: direct tuples, computed usersets, tuple-to-userset
//! walks, and the union/intersection/difference combinators. Combinator
//! children run concurrently with first-decisive-wins semantics; a
//! decisive outcome cancels the scope shared by in-flight siblings so
//! storage iterators and nested checks unwind promptly.
//!
//! Sub-checks re-enter the resolver chain through the configured delegate
//! (normally the cached resolver) so repeated sub-problems are memoized.
//! The recursion depth is carried in the request and strictly increases
//! down each branch; cycles in the relation graph terminate with
//! `ResolutionDepthExceeded` on that branch.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tessera_storage::{ReadUsersetTuplesFilter, TupleKey, TupleReader, UserRef};

use crate::error::{DomainError, DomainResult};
use crate::model::{ModelReader, RelationReference, TypeSystem, Userset};

use super::contextual::ContextualTuples;
use super::traits::CheckResolver;
use super::types::{ResolutionMetadata, ResolveCheckRequest, ResolveCheckResponse};

/// Default maximum recursion depth (matches the upstream default of 25).
pub const DEFAULT_RESOLUTION_DEPTH_LIMIT: u32 = 25;

/// Default bound on concurrently executing sub-checks per evaluator.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 100;

/// Configuration for the local check evaluator.
#[derive(Debug, Clone)]
pub struct LocalCheckerConfig {
    /// Maximum recursion depth before a branch fails with
    /// `ResolutionDepthExceeded`.
    pub resolution_depth_limit: u32,
    /// Permits on the fan-out semaphore; saturated combinators fall back
    /// to sequential evaluation.
    pub concurrency_limit: usize,
    /// Deadline applied to root requests.
    pub timeout: Duration,
}

impl Default for LocalCheckerConfig {
    fn default() -> Self {
        Self {
            resolution_depth_limit: DEFAULT_RESOLUTION_DEPTH_LIMIT,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            timeout: Duration::from_secs(30),
        }
    }
}

impl LocalCheckerConfig {
    /// Sets the resolution depth limit.
    pub fn with_resolution_depth_limit(mut self, limit: u32) -> Self {
        self.resolution_depth_limit = limit;
        self
    }

    /// Sets the concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Sets the root request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Type alias for boxed futures to handle async recursion.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The recursive check evaluator.
pub struct LocalChecker {
    datastore: Arc<dyn TupleReader>,
    models: Arc<dyn ModelReader>,
    limiter: Arc<Semaphore>,
    config: LocalCheckerConfig,
    /// Head of the resolver chain for sub-check dispatch. Held weakly so
    /// the chain has no strong reference cycle; an unwired checker
    /// evaluates sub-checks against itself.
    delegate: RwLock<Option<Weak<dyn CheckResolver>>>,
}

impl LocalChecker {
    /// Creates a new evaluator with default configuration.
    pub fn new(datastore: Arc<dyn TupleReader>, models: Arc<dyn ModelReader>) -> Self {
        Self::with_config(datastore, models, LocalCheckerConfig::default())
    }

    /// Creates a new evaluator with custom configuration.
    pub fn with_config(
        datastore: Arc<dyn TupleReader>,
        models: Arc<dyn ModelReader>,
        config: LocalCheckerConfig,
    ) -> Self {
        Self {
            datastore,
            models,
            limiter: Arc::new(Semaphore::new(config.concurrency_limit)),
            config,
            delegate: RwLock::new(None),
        }
    }

    /// Rebinds the delegate sub-checks are dispatched through.
    pub fn set_delegate(&self, delegate: Weak<dyn CheckResolver>) {
        *self
            .delegate
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(delegate);
    }

    fn delegate(&self) -> Option<Arc<dyn CheckResolver>> {
        self.delegate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Dispatches a sub-check through the head of the resolver chain.
    async fn dispatch(&self, req: ResolveCheckRequest) -> DomainResult<ResolveCheckResponse> {
        match self.delegate() {
            Some(delegate) => delegate.resolve_check(req).await,
            None => self.resolve(req).await,
        }
    }

    async fn resolve(&self, req: ResolveCheckRequest) -> DomainResult<ResolveCheckResponse> {
        if req.cancellation.is_cancelled() {
            return Err(DomainError::Canceled);
        }
        if req.resolution_depth >= self.config.resolution_depth_limit {
            return Err(DomainError::ResolutionDepthExceeded {
                limit: self.config.resolution_depth_limit,
            });
        }

        let (object_type, _) = req
            .tuple_key
            .split_object()
            .map_err(DomainError::invalid_tuple_key)?;
        let typesystem = self
            .models
            .typesystem(&req.store_id, &req.authorization_model_id)
            .await?;
        let rewrite = typesystem.rewrite(object_type, &req.tuple_key.relation)?;
        let overlay = ContextualTuples::new(&req.contextual_tuples);

        let allowed = self
            .evaluate_rewrite(&req, &typesystem, &overlay, &rewrite)
            .await?;
        Ok(ResolveCheckResponse {
            allowed,
            resolution_metadata: ResolutionMetadata {
                datastore_query_count: req.metadata.datastore_query_count(),
            },
        })
    }

    /// Evaluates a rewrite expression (boxed for recursion).
    fn evaluate_rewrite<'a>(
        &'a self,
        req: &'a ResolveCheckRequest,
        typesystem: &'a TypeSystem,
        overlay: &'a ContextualTuples,
        rewrite: &'a Userset,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            match rewrite {
                Userset::This => self.evaluate_direct(req, typesystem, overlay).await,

                Userset::ComputedUserset { relation } => {
                    let sub = req.descend(TupleKey::new(
                        req.tuple_key.object.clone(),
                        relation.clone(),
                        req.tuple_key.user.clone(),
                    ));
                    Ok(self.dispatch(sub).await?.allowed)
                }

                Userset::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    self.evaluate_tuple_to_userset(req, overlay, tupleset, computed_userset)
                        .await
                }

                Userset::Union { children } => {
                    let scope = req.cancellation.child_token();
                    let scoped = req.scoped(scope.clone());
                    let scoped = &scoped;
                    let branches: Vec<_> = children
                        .iter()
                        .map(|child| self.evaluate_rewrite(scoped, typesystem, overlay, child))
                        .collect();
                    self.resolve_any(&scope, branches).await
                }

                Userset::Intersection { children } => {
                    let scope = req.cancellation.child_token();
                    let scoped = req.scoped(scope.clone());
                    let scoped = &scoped;
                    let branches: Vec<_> = children
                        .iter()
                        .map(|child| self.evaluate_rewrite(scoped, typesystem, overlay, child))
                        .collect();
                    self.resolve_all(&scope, branches).await
                }

                Userset::Difference { base, subtract } => {
                    self.evaluate_difference(req, typesystem, overlay, base, subtract)
                        .await
                }
            }
        })
    }

    /// Direct check: exact match first, then the userset/wildcard scan.
    async fn evaluate_direct(
        &self,
        req: &ResolveCheckRequest,
        typesystem: &TypeSystem,
        overlay: &ContextualTuples,
    ) -> DomainResult<bool> {
        let (object_type, _) = req
            .tuple_key
            .split_object()
            .map_err(DomainError::invalid_tuple_key)?;
        let direct_types =
            typesystem.directly_related_user_types(object_type, &req.tuple_key.relation)?;
        let subject = req
            .tuple_key
            .user_ref()
            .map_err(DomainError::invalid_tuple_key)?;

        match subject {
            UserRef::Object { .. } => {
                if directly_assignable(&direct_types, &subject) {
                    if overlay.contains(&req.tuple_key) {
                        return Ok(true);
                    }
                    req.metadata.record_datastore_query();
                    if self
                        .datastore
                        .read_user_tuple(&req.cancellation, &req.store_id, &req.tuple_key)
                        .await?
                        .is_some()
                    {
                        return Ok(true);
                    }
                }
                self.evaluate_direct_usersets(req, &direct_types, overlay, &subject)
                    .await
            }
            UserRef::Userset { .. } => self.userset_identity_match(req, overlay).await,
            UserRef::Wildcard { .. } => Err(DomainError::InvalidTupleKey {
                message: format!(
                    "a typed wildcard cannot be the subject of a check: '{}'",
                    req.tuple_key.user
                ),
            }),
        }
    }

    /// Scans userset and wildcard tuples for the checked (object,
    /// relation): a matching typed wildcard decides immediately, userset
    /// references fan out as sub-checks.
    async fn evaluate_direct_usersets(
        &self,
        req: &ResolveCheckRequest,
        direct_types: &[RelationReference],
        overlay: &ContextualTuples,
        subject: &UserRef,
    ) -> DomainResult<bool> {
        let scope = req.cancellation.child_token();
        req.metadata.record_datastore_query();
        let stored = self
            .datastore
            .read_userset_tuples(
                &scope,
                &req.store_id,
                ReadUsersetTuplesFilter::indirect(
                    req.tuple_key.object.clone(),
                    req.tuple_key.relation.clone(),
                ),
            )
            .await?;

        // overlay tuples merge ahead of the storage stream, de-duplicated
        // by user (object and relation are fixed here)
        let overlay_tuples: Vec<_> = overlay
            .tuples_for(&req.tuple_key.object, &req.tuple_key.relation)
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        let mut merged = stream::iter(overlay_tuples).chain(stored);

        let mut seen: HashSet<String> = HashSet::new();
        let mut dispatches: Vec<BoxFuture<'_, DomainResult<bool>>> = Vec::new();
        while let Some(tuple) = merged.next().await {
            let tuple = tuple?;
            if !seen.insert(tuple.user.clone()) {
                continue;
            }
            let user = tuple.user_ref().map_err(DomainError::invalid_tuple_key)?;
            match &user {
                UserRef::Wildcard { user_type } => {
                    if user_type == subject.user_type()
                        && directly_assignable(direct_types, &user)
                    {
                        scope.cancel();
                        return Ok(true);
                    }
                }
                UserRef::Userset {
                    user_type,
                    user_id,
                    relation,
                } => {
                    if !directly_assignable(direct_types, &user) {
                        continue;
                    }
                    let sub = req.descend_scoped(
                        TupleKey::new(
                            format!("{user_type}:{user_id}"),
                            relation.clone(),
                            req.tuple_key.user.clone(),
                        ),
                        scope.clone(),
                    );
                    dispatches
                        .push(Box::pin(async move { Ok(self.dispatch(sub).await?.allowed) }));
                }
                // concrete users were covered by the exact point lookup
                UserRef::Object { .. } => {}
            }
        }
        if req.cancellation.is_cancelled() {
            return Err(DomainError::Canceled);
        }

        self.resolve_any(&scope, dispatches).await
    }

    /// Identity match for a userset subject: the tuple (object, relation,
    /// subject) itself must exist.
    async fn userset_identity_match(
        &self,
        req: &ResolveCheckRequest,
        overlay: &ContextualTuples,
    ) -> DomainResult<bool> {
        if overlay.contains(&req.tuple_key) {
            return Ok(true);
        }
        req.metadata.record_datastore_query();
        let mut stored = self
            .datastore
            .read_userset_tuples(
                &req.cancellation,
                &req.store_id,
                ReadUsersetTuplesFilter::indirect(
                    req.tuple_key.object.clone(),
                    req.tuple_key.relation.clone(),
                ),
            )
            .await?;
        while let Some(tuple) = stored.next().await {
            if tuple?.user == req.tuple_key.user {
                return Ok(true);
            }
        }
        if req.cancellation.is_cancelled() {
            return Err(DomainError::Canceled);
        }
        Ok(false)
    }

    /// Walks the tupleset relation: each object it yields becomes the
    /// target of a computed-relation sub-check.
    async fn evaluate_tuple_to_userset(
        &self,
        req: &ResolveCheckRequest,
        overlay: &ContextualTuples,
        tupleset: &str,
        computed_userset: &str,
    ) -> DomainResult<bool> {
        let scope = req.cancellation.child_token();
        req.metadata.record_datastore_query();
        let stored = self
            .datastore
            .read_userset_tuples(
                &scope,
                &req.store_id,
                ReadUsersetTuplesFilter::any_user(req.tuple_key.object.clone(), tupleset),
            )
            .await?;

        let overlay_tuples: Vec<_> = overlay
            .tuples_for(&req.tuple_key.object, tupleset)
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        let mut merged = stream::iter(overlay_tuples).chain(stored);

        let mut seen: HashSet<String> = HashSet::new();
        let mut dispatches: Vec<BoxFuture<'_, DomainResult<bool>>> = Vec::new();
        while let Some(tuple) = merged.next().await {
            let tuple = tuple?;
            if !seen.insert(tuple.user.clone()) {
                continue;
            }
            // the tupleset relation yields objects
            let parent_object = match tuple.user_ref().map_err(DomainError::invalid_tuple_key)? {
                UserRef::Object { user_type, user_id }
                | UserRef::Userset {
                    user_type, user_id, ..
                } => format!("{user_type}:{user_id}"),
                UserRef::Wildcard { .. } => continue,
            };
            let sub = req.descend_scoped(
                TupleKey::new(
                    parent_object,
                    computed_userset.to_string(),
                    req.tuple_key.user.clone(),
                ),
                scope.clone(),
            );
            dispatches.push(Box::pin(async move { Ok(self.dispatch(sub).await?.allowed) }));
        }
        if req.cancellation.is_cancelled() {
            return Err(DomainError::Canceled);
        }

        self.resolve_any(&scope, dispatches).await
    }

    /// Difference: base minus subtract, both racing under one scope.
    async fn evaluate_difference<'a>(
        &'a self,
        req: &'a ResolveCheckRequest,
        typesystem: &'a TypeSystem,
        overlay: &'a ContextualTuples,
        base: &'a Userset,
        subtract: &'a Userset,
    ) -> DomainResult<bool> {
        let scope = req.cancellation.child_token();
        let scoped = req.scoped(scope.clone());
        let scoped = &scoped;

        let mut branches: FuturesUnordered<BoxFuture<'_, (bool, DomainResult<bool>)>> =
            FuturesUnordered::new();
        branches.push(Box::pin(async move {
            (
                true,
                self.evaluate_rewrite(scoped, typesystem, overlay, base).await,
            )
        }));
        branches.push(Box::pin(async move {
            (
                false,
                self.evaluate_rewrite(scoped, typesystem, overlay, subtract)
                    .await,
            )
        }));

        let mut base_result: Option<DomainResult<bool>> = None;
        let mut subtract_result: Option<DomainResult<bool>> = None;
        while let Some((is_base, result)) = branches.next().await {
            // base=false or subtract=true is decisive on its own
            if matches!((is_base, &result), (true, Ok(false)) | (false, Ok(true))) {
                scope.cancel();
                return Ok(false);
            }
            if is_base {
                base_result = Some(result);
            } else {
                subtract_result = Some(result);
            }
        }

        match (base_result, subtract_result) {
            (Some(Ok(true)), Some(Ok(false))) => Ok(true),
            // the branch the outcome depends on errored
            (Some(Err(err)), _) | (_, Some(Err(err))) => Err(err),
            _ => Ok(false),
        }
    }

    /// First `true` wins; `ResolutionDepthExceeded` is branch-local and
    /// only surfaces when no branch produced an answer; any other error
    /// aborts. A decisive outcome cancels `scope` for in-flight siblings.
    async fn resolve_any<F>(
        &self,
        scope: &CancellationToken,
        branches: Vec<F>,
    ) -> DomainResult<bool>
    where
        F: Future<Output = DomainResult<bool>> + Send,
    {
        let (mut concurrent, sequential) = self.admit(branches);

        let mut saw_false = false;
        let mut depth_exceeded: Option<DomainError> = None;

        while let Some(result) = concurrent.next().await {
            match result {
                Ok(true) => {
                    scope.cancel();
                    return Ok(true);
                }
                Ok(false) => saw_false = true,
                Err(err @ DomainError::ResolutionDepthExceeded { .. }) => {
                    depth_exceeded = Some(err);
                }
                Err(err) => {
                    scope.cancel();
                    return Err(err);
                }
            }
        }
        for branch in sequential {
            match branch.await {
                Ok(true) => {
                    scope.cancel();
                    return Ok(true);
                }
                Ok(false) => saw_false = true,
                Err(err @ DomainError::ResolutionDepthExceeded { .. }) => {
                    depth_exceeded = Some(err);
                }
                Err(err) => {
                    scope.cancel();
                    return Err(err);
                }
            }
        }

        // if every branch hit the depth bound, the answer is unknown
        if !saw_false {
            if let Some(err) = depth_exceeded {
                return Err(err);
            }
        }
        Ok(false)
    }

    /// Every branch must be `true`; the first `false` or error cancels
    /// the scope and decides.
    async fn resolve_all<F>(
        &self,
        scope: &CancellationToken,
        branches: Vec<F>,
    ) -> DomainResult<bool>
    where
        F: Future<Output = DomainResult<bool>> + Send,
    {
        let (mut concurrent, sequential) = self.admit(branches);

        while let Some(result) = concurrent.next().await {
            match result {
                Ok(true) => {}
                Ok(false) => {
                    scope.cancel();
                    return Ok(false);
                }
                Err(err) => {
                    scope.cancel();
                    return Err(err);
                }
            }
        }
        for branch in sequential {
            match branch.await {
                Ok(true) => {}
                Ok(false) => {
                    scope.cancel();
                    return Ok(false);
                }
                Err(err) => {
                    scope.cancel();
                    return Err(err);
                }
            }
        }
        Ok(true)
    }

    /// Splits branches into a concurrent set, gated by the fan-out
    /// semaphore, and a sequential remainder for when the limiter is
    /// saturated.
    #[allow(clippy::type_complexity)]
    fn admit<F>(
        &self,
        branches: Vec<F>,
    ) -> (
        FuturesUnordered<impl Future<Output = DomainResult<bool>>>,
        Vec<F>,
    )
    where
        F: Future<Output = DomainResult<bool>> + Send,
    {
        let concurrent = FuturesUnordered::new();
        let mut sequential = Vec::new();
        for branch in branches {
            match Arc::clone(&self.limiter).try_acquire_owned() {
                Ok(permit) => concurrent.push(async move {
                    let _permit = permit;
                    branch.await
                }),
                Err(_) => sequential.push(branch),
            }
        }
        (concurrent, sequential)
    }
}

/// Whether a relation's direct user types admit this user. An empty list
/// places no restriction.
fn directly_assignable(direct_types: &[RelationReference], user: &UserRef) -> bool {
    direct_types.is_empty() || direct_types.iter().any(|reference| reference.matches(user))
}

#[async_trait]
impl CheckResolver for LocalChecker {
    async fn resolve_check(&self, req: ResolveCheckRequest) -> DomainResult<ResolveCheckResponse> {
        if req.resolution_depth == 0 {
            let deadline = self.config.timeout;
            match timeout(deadline, self.resolve(req)).await {
                Ok(result) => result,
                Err(_) => Err(DomainError::DeadlineExceeded {
                    duration_ms: deadline.as_millis() as u64,
                }),
            }
        } else {
            self.resolve(req).await
        }
    }
}
