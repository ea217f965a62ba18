//! Per-request contextual tuple overlay.
//!
//! Contextual tuples are an additive overlay visible only to the current
//! request; they shadow nothing and are never written to storage. The
//! overlay is indexed by (object, relation) so point lookups and scan
//! merges stay O(1) per probe.

use std::collections::{HashMap, HashSet};

use tessera_storage::TupleKey;

/// Immutable index over a request's contextual tuples.
#[derive(Debug)]
pub(crate) struct ContextualTuples {
    by_object_relation: HashMap<(String, String), Vec<TupleKey>>,
}

impl ContextualTuples {
    pub(crate) fn new(tuples: &[TupleKey]) -> Self {
        let mut by_object_relation: HashMap<(String, String), Vec<TupleKey>> = HashMap::new();
        let mut seen: HashSet<&TupleKey> = HashSet::new();
        for tuple in tuples {
            // de-duplicate structurally identical overlay tuples
            if seen.insert(tuple) {
                by_object_relation
                    .entry((tuple.object.clone(), tuple.relation.clone()))
                    .or_default()
                    .push(tuple.clone());
            }
        }
        Self { by_object_relation }
    }

    /// Exact (object, relation, user) membership.
    pub(crate) fn contains(&self, key: &TupleKey) -> bool {
        self.by_object_relation
            .get(&(key.object.clone(), key.relation.clone()))
            .is_some_and(|tuples| tuples.iter().any(|t| t.user == key.user))
    }

    /// All overlay tuples for an (object, relation) pair, in input order.
    pub(crate) fn tuples_for(&self, object: &str, relation: &str) -> &[TupleKey] {
        self.by_object_relation
            .get(&(object.to_string(), relation.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
