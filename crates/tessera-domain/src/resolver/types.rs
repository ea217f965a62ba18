//! Request and response types for check resolution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use tessera_storage::TupleKey;

/// Caller preference between cache freshness and latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsistencyPreference {
    /// No preference expressed; treated like `MinimizeLatency`.
    #[default]
    Unspecified,
    /// Cached sub-problem results may be served.
    MinimizeLatency,
    /// Bypass the sub-problem cache entirely.
    HigherConsistency,
}

/// Per-request bookkeeping shared by every sub-check of one resolution
/// tree. Cloning shares the underlying counters.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    datastore_query_count: Arc<AtomicU32>,
}

impl RequestMetadata {
    /// Creates fresh metadata for a root request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one datastore query.
    pub fn record_datastore_query(&self) {
        self.datastore_query_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of datastore queries recorded so far.
    pub fn datastore_query_count(&self) -> u32 {
        self.datastore_query_count.load(Ordering::Relaxed)
    }
}

/// A check resolution request.
///
/// Sub-checks are derived from their parent request and share its
/// contextual tuples, context map, metadata counters, and (unless a
/// combinator narrows it) cancellation scope.
#[derive(Debug, Clone)]
pub struct ResolveCheckRequest {
    /// The store the check runs against.
    pub store_id: String,
    /// The authorization model the check runs against.
    pub authorization_model_id: String,
    /// The tuple key being asked.
    pub tuple_key: TupleKey,
    /// Per-request overlay tuples, not persisted.
    /// Wrapped in Arc for cheap cloning during resolution.
    pub contextual_tuples: Arc<Vec<TupleKey>>,
    /// Opaque context for conditional relations. Only its canonical
    /// fingerprint participates in resolution (cache keying).
    pub context: Arc<HashMap<String, serde_json::Value>>,
    /// Current recursion depth; strictly increases down each branch.
    pub resolution_depth: u32,
    /// Cached sub-problem entries at or before this instant are ignored.
    pub last_cache_invalidation_time: DateTime<Utc>,
    /// Consistency preference for this request.
    pub consistency: ConsistencyPreference,
    /// Shared per-request counters.
    pub metadata: RequestMetadata,
    /// Cancellation scope for this branch of the resolution tree.
    pub cancellation: CancellationToken,
}

impl ResolveCheckRequest {
    /// Creates a root request with default overlays and scope.
    pub fn new(
        store_id: impl Into<String>,
        authorization_model_id: impl Into<String>,
        tuple_key: TupleKey,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            authorization_model_id: authorization_model_id.into(),
            tuple_key,
            contextual_tuples: Arc::new(Vec::new()),
            context: Arc::new(HashMap::new()),
            resolution_depth: 0,
            last_cache_invalidation_time: DateTime::UNIX_EPOCH,
            consistency: ConsistencyPreference::default(),
            metadata: RequestMetadata::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the contextual tuple overlay.
    pub fn with_contextual_tuples(mut self, tuples: Vec<TupleKey>) -> Self {
        self.contextual_tuples = Arc::new(tuples);
        self
    }

    /// Sets the context map.
    pub fn with_context(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = Arc::new(context);
        self
    }

    /// Sets the consistency preference.
    pub fn with_consistency(mut self, consistency: ConsistencyPreference) -> Self {
        self.consistency = consistency;
        self
    }

    /// Sets the caller's write fence for cache freshness.
    pub fn with_last_cache_invalidation_time(mut self, at: DateTime<Utc>) -> Self {
        self.last_cache_invalidation_time = at;
        self
    }

    /// Sets the cancellation scope.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Derives a sub-check for a new tuple key, one level deeper.
    pub(crate) fn descend(&self, tuple_key: TupleKey) -> Self {
        let mut sub = self.clone();
        sub.tuple_key = tuple_key;
        sub.resolution_depth = self.resolution_depth + 1;
        sub
    }

    /// Derives a sub-check under a combinator's cancellation scope.
    pub(crate) fn descend_scoped(
        &self,
        tuple_key: TupleKey,
        cancellation: CancellationToken,
    ) -> Self {
        let mut sub = self.descend(tuple_key);
        sub.cancellation = cancellation;
        sub
    }

    /// Re-scopes this request under a combinator's cancellation token
    /// without descending.
    pub(crate) fn scoped(&self, cancellation: CancellationToken) -> Self {
        let mut scoped = self.clone();
        scoped.cancellation = cancellation;
        scoped
    }
}

/// Resolution statistics reported with a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionMetadata {
    /// Datastore queries performed by the request tree up to the point
    /// this response was produced.
    pub datastore_query_count: u32,
}

/// The answer to a check resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveCheckResponse {
    /// Whether the user has the relation on the object.
    pub allowed: bool,
    /// Resolution statistics.
    pub resolution_metadata: ResolutionMetadata,
}

impl ResolveCheckResponse {
    /// Creates a response with empty metadata.
    pub fn new(allowed: bool) -> Self {
        Self {
            allowed,
            resolution_metadata: ResolutionMetadata::default(),
        }
    }
}
