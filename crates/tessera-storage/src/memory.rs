//! In-memory storage implementation.
//!
//! Uses `HashSet<TupleKey>` per store for O(1) write/delete and structural
//! de-duplication; reads are linear scans over the store's tuples.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::StorageResult;
use crate::traits::{
    validate_tuple_key, ReadStartingWithUserFilter, ReadUsersetTuplesFilter, TupleKey, TupleReader,
    TupleStream, UserRef, UsersetUserFilter,
};

use async_trait::async_trait;

/// In-memory implementation of the tuple read facade.
///
/// Thread-safe via `DashMap`; a store springs into existence on first
/// write and reads against an unknown store see no tuples.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    tuples: DashMap<String, HashSet<TupleKey>>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Writes tuples into a store, creating the store if needed.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidInput` if any key is malformed.
    pub fn write(&self, store_id: &str, writes: Vec<TupleKey>) -> StorageResult<()> {
        for key in &writes {
            validate_tuple_key(key)?;
        }
        let mut tuples = self.tuples.entry(store_id.to_string()).or_default();
        tuples.extend(writes);
        Ok(())
    }

    /// Deletes a tuple from a store. Deleting an absent tuple is a no-op.
    pub fn delete(&self, store_id: &str, key: &TupleKey) {
        if let Some(mut tuples) = self.tuples.get_mut(store_id) {
            tuples.remove(key);
        }
    }

    /// Returns the number of tuples stored for a store.
    pub fn tuple_count(&self, store_id: &str) -> usize {
        self.tuples.get(store_id).map(|t| t.len()).unwrap_or(0)
    }

    fn collect_matching<F>(&self, store_id: &str, predicate: F) -> Vec<TupleKey>
    where
        F: Fn(&TupleKey) -> bool,
    {
        self.tuples
            .get(store_id)
            .map(|tuples| tuples.iter().filter(|t| predicate(t)).cloned().collect())
            .unwrap_or_default()
    }
}

/// Wraps collected matches into a stream that stops at cancellation.
fn stream_tuples(matches: Vec<TupleKey>, cancel: CancellationToken) -> TupleStream {
    stream::iter(matches.into_iter().map(Ok))
        .take_while(move |_| {
            let live = !cancel.is_cancelled();
            async move { live }
        })
        .boxed()
}

#[async_trait]
impl TupleReader for MemoryDataStore {
    #[instrument(skip(self, _cancel), fields(store_id = %store_id))]
    async fn read_user_tuple(
        &self,
        _cancel: &CancellationToken,
        store_id: &str,
        tuple_key: &TupleKey,
    ) -> StorageResult<Option<TupleKey>> {
        Ok(self
            .tuples
            .get(store_id)
            .and_then(|tuples| tuples.get(tuple_key).cloned()))
    }

    #[instrument(skip(self, cancel), fields(store_id = %store_id))]
    async fn read_userset_tuples(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        filter: ReadUsersetTuplesFilter,
    ) -> StorageResult<TupleStream> {
        let matches = self.collect_matching(store_id, |t| {
            if t.object != filter.object || t.relation != filter.relation {
                return false;
            }
            match filter.user_filter {
                UsersetUserFilter::Any => true,
                UsersetUserFilter::Indirect => matches!(
                    UserRef::parse(&t.user),
                    Ok(UserRef::Userset { .. }) | Ok(UserRef::Wildcard { .. })
                ),
            }
        });
        Ok(stream_tuples(matches, cancel.clone()))
    }

    #[instrument(skip(self, cancel), fields(store_id = %store_id))]
    async fn read_starting_with_user(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        filter: ReadStartingWithUserFilter,
    ) -> StorageResult<TupleStream> {
        let users: HashSet<&str> = filter.user_filter.iter().map(|u| u.as_str()).collect();
        let matches = self.collect_matching(store_id, |t| {
            t.relation == filter.relation
                && t.object
                    .split_once(':')
                    .is_some_and(|(object_type, _)| object_type == filter.object_type)
                && users.contains(t.user.as_str())
        });
        Ok(stream_tuples(matches, cancel.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_store() -> MemoryDataStore {
        let store = MemoryDataStore::new();
        store
            .write(
                "store1",
                vec![
                    TupleKey::new("document:readme", "viewer", "user:alice"),
                    TupleKey::new("document:readme", "viewer", "group:eng#member"),
                    TupleKey::new("document:readme", "viewer", "user:*"),
                    TupleKey::new("document:readme", "editor", "user:bob"),
                    TupleKey::new("document:notes", "viewer", "user:alice"),
                ],
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_read_user_tuple_point_lookup() {
        let store = populated_store();
        let cancel = CancellationToken::new();

        let key = TupleKey::new("document:readme", "viewer", "user:alice");
        let found = store
            .read_user_tuple(&cancel, "store1", &key)
            .await
            .unwrap();
        assert_eq!(found, Some(key));
    }

    #[tokio::test]
    async fn test_read_user_tuple_absent_is_none() {
        let store = populated_store();
        let cancel = CancellationToken::new();

        let key = TupleKey::new("document:readme", "viewer", "user:carol");
        let found = store
            .read_user_tuple(&cancel, "store1", &key)
            .await
            .unwrap();
        assert_eq!(found, None);

        // unknown store reads as empty, not as an error
        let found = store
            .read_user_tuple(&cancel, "missing", &key)
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_read_userset_tuples_indirect_only() {
        let store = populated_store();
        let cancel = CancellationToken::new();

        let stream = store
            .read_userset_tuples(
                &cancel,
                "store1",
                ReadUsersetTuplesFilter::indirect("document:readme", "viewer"),
            )
            .await
            .unwrap();
        let mut users: Vec<String> = stream
            .map(|t| t.unwrap().user)
            .collect::<Vec<_>>()
            .await;
        users.sort();

        assert_eq!(users, vec!["group:eng#member", "user:*"]);
    }

    #[tokio::test]
    async fn test_read_userset_tuples_any_user() {
        let store = populated_store();
        let cancel = CancellationToken::new();

        let stream = store
            .read_userset_tuples(
                &cancel,
                "store1",
                ReadUsersetTuplesFilter::any_user("document:readme", "viewer"),
            )
            .await
            .unwrap();
        assert_eq!(stream.count().await, 3);
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops_producing() {
        let store = populated_store();
        let cancel = CancellationToken::new();

        let stream = store
            .read_userset_tuples(
                &cancel,
                "store1",
                ReadUsersetTuplesFilter::any_user("document:readme", "viewer"),
            )
            .await
            .unwrap();

        cancel.cancel();
        assert_eq!(stream.count().await, 0);
    }

    #[tokio::test]
    async fn test_read_starting_with_user() {
        let store = populated_store();
        let cancel = CancellationToken::new();

        let stream = store
            .read_starting_with_user(
                &cancel,
                "store1",
                ReadStartingWithUserFilter {
                    object_type: "document".to_string(),
                    relation: "viewer".to_string(),
                    user_filter: vec!["user:alice".to_string()],
                },
            )
            .await
            .unwrap();
        let mut objects: Vec<String> = stream
            .map(|t| t.unwrap().object)
            .collect::<Vec<_>>()
            .await;
        objects.sort();

        assert_eq!(objects, vec!["document:notes", "document:readme"]);
    }

    #[tokio::test]
    async fn test_write_validates_and_delete_removes() {
        let store = MemoryDataStore::new();

        let invalid = TupleKey::new("readme", "viewer", "user:alice");
        assert!(store.write("store1", vec![invalid]).is_err());

        let key = TupleKey::new("document:readme", "viewer", "user:alice");
        store.write("store1", vec![key.clone(), key.clone()]).unwrap();
        // structural de-duplication
        assert_eq!(store.tuple_count("store1"), 1);

        store.delete("store1", &key);
        assert_eq!(store.tuple_count("store1"), 0);
    }
}
