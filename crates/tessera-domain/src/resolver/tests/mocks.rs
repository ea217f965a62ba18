//! Shared fixtures for resolver tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use tessera_storage::{
    MemoryDataStore, ReadStartingWithUserFilter, ReadUsersetTuplesFilter, StorageError,
    StorageResult, TupleKey, TupleReader, TupleStream,
};

use crate::error::DomainResult;
use crate::model::{
    AuthorizationModel, RelationDefinition, RelationReference, StaticModelReader, TypeDefinition,
    Userset,
};
use crate::resolver::{CheckResolver, ResolveCheckRequest, ResolveCheckResponse};

// store/model IDs are ULIDs minted per test run; every fixture helper
// below keys against the same pair
pub(crate) static STORE_ID: LazyLock<String> = LazyLock::new(|| Ulid::new().to_string());
pub(crate) static MODEL_ID: LazyLock<String> = LazyLock::new(|| Ulid::new().to_string());

pub(crate) fn direct_type(type_name: &str) -> RelationReference {
    RelationReference::Type(type_name.to_string())
}

pub(crate) fn direct_userset(type_name: &str, relation: &str) -> RelationReference {
    RelationReference::Userset {
        type_name: type_name.to_string(),
        relation: relation.to_string(),
    }
}

pub(crate) fn direct_wildcard(type_name: &str) -> RelationReference {
    RelationReference::Wildcard(type_name.to_string())
}

pub(crate) fn relation(
    name: &str,
    directly_related_user_types: Vec<RelationReference>,
    rewrite: Userset,
) -> RelationDefinition {
    RelationDefinition {
        name: name.to_string(),
        directly_related_user_types,
        rewrite,
    }
}

pub(crate) fn type_def(type_name: &str, relations: Vec<RelationDefinition>) -> TypeDefinition {
    TypeDefinition {
        type_name: type_name.to_string(),
        relations,
    }
}

pub(crate) fn model(type_definitions: Vec<TypeDefinition>) -> AuthorizationModel {
    AuthorizationModel::with_types(MODEL_ID.as_str(), "1.1", type_definitions)
}

pub(crate) fn registry(model: AuthorizationModel) -> Arc<StaticModelReader> {
    let reader = StaticModelReader::new();
    reader.register(STORE_ID.as_str(), model);
    Arc::new(reader)
}

pub(crate) fn request(object: &str, rel: &str, user: &str) -> ResolveCheckRequest {
    ResolveCheckRequest::new(
        STORE_ID.as_str(),
        MODEL_ID.as_str(),
        TupleKey::new(object, rel, user),
    )
}

/// Datastore wrapper that delays userset scans on one relation and
/// records whether the scan's cancellation scope was cancelled.
pub(crate) struct SlowDataStore {
    pub(crate) inner: MemoryDataStore,
    slow_relation: String,
    delay: Duration,
    observed_cancellation: Arc<AtomicBool>,
}

impl SlowDataStore {
    pub(crate) fn new(inner: MemoryDataStore, slow_relation: &str, delay: Duration) -> Self {
        Self {
            inner,
            slow_relation: slow_relation.to_string(),
            delay,
            observed_cancellation: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.observed_cancellation)
    }
}

#[async_trait]
impl TupleReader for SlowDataStore {
    async fn read_user_tuple(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        tuple_key: &TupleKey,
    ) -> StorageResult<Option<TupleKey>> {
        self.inner.read_user_tuple(cancel, store_id, tuple_key).await
    }

    async fn read_userset_tuples(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        filter: ReadUsersetTuplesFilter,
    ) -> StorageResult<TupleStream> {
        if filter.relation == self.slow_relation {
            let scope = cancel.clone();
            let flag = Arc::clone(&self.observed_cancellation);
            tokio::spawn(async move {
                scope.cancelled().await;
                flag.store(true, Ordering::SeqCst);
            });
            tokio::time::sleep(self.delay).await;
        }
        self.inner.read_userset_tuples(cancel, store_id, filter).await
    }

    async fn read_starting_with_user(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        filter: ReadStartingWithUserFilter,
    ) -> StorageResult<TupleStream> {
        self.inner
            .read_starting_with_user(cancel, store_id, filter)
            .await
    }
}

/// Datastore whose point lookups fail with a transient error.
pub(crate) struct FailingDataStore;

#[async_trait]
impl TupleReader for FailingDataStore {
    async fn read_user_tuple(
        &self,
        _cancel: &CancellationToken,
        _store_id: &str,
        _tuple_key: &TupleKey,
    ) -> StorageResult<Option<TupleKey>> {
        Err(StorageError::QueryError {
            message: "connection reset".to_string(),
        })
    }

    async fn read_userset_tuples(
        &self,
        _cancel: &CancellationToken,
        _store_id: &str,
        _filter: ReadUsersetTuplesFilter,
    ) -> StorageResult<TupleStream> {
        Err(StorageError::QueryError {
            message: "connection reset".to_string(),
        })
    }

    async fn read_starting_with_user(
        &self,
        _cancel: &CancellationToken,
        _store_id: &str,
        _filter: ReadStartingWithUserFilter,
    ) -> StorageResult<TupleStream> {
        Err(StorageError::QueryError {
            message: "connection reset".to_string(),
        })
    }
}

/// Resolver that answers every check with a fixed response.
pub(crate) struct StubResolver {
    pub(crate) allowed: bool,
}

#[async_trait]
impl CheckResolver for StubResolver {
    async fn resolve_check(
        &self,
        _req: ResolveCheckRequest,
    ) -> DomainResult<ResolveCheckResponse> {
        Ok(ResolveCheckResponse::new(self.allowed))
    }
}
