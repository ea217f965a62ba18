//! Type system for authorization model lookups with caching.
//!
//! The `TypeSystem` provides read-only lookups over one authorization
//! model: the rewrite expression of a relation and the user types a
//! relation accepts directly. Lookups are lazily cached behind `DashMap`
//! so the view can be shared across concurrent checks.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{DomainError, DomainResult};

use super::types::{
    AuthorizationModel, RelationDefinition, RelationReference, TypeDefinition, Userset,
};

/// Read-only view over one authorization model.
///
/// # Thread Safety
///
/// The `TypeSystem` is thread-safe and shared across async tasks. It uses
/// `DashMap` internally for lock-free concurrent reads.
#[derive(Debug)]
pub struct TypeSystem {
    /// The underlying authorization model.
    model: Arc<AuthorizationModel>,
    /// Cache for type definitions, keyed by type name.
    type_cache: DashMap<String, Arc<TypeDefinition>>,
    /// Cache for relation definitions, keyed by "type_name:relation_name".
    relation_cache: DashMap<String, Arc<RelationDefinition>>,
}

impl TypeSystem {
    /// Creates a new `TypeSystem` from an authorization model.
    ///
    /// The type system will lazily cache lookups as they are accessed.
    pub fn new(model: AuthorizationModel) -> Self {
        Self {
            model: Arc::new(model),
            type_cache: DashMap::new(),
            relation_cache: DashMap::new(),
        }
    }

    /// Returns a reference to the underlying authorization model.
    pub fn model(&self) -> &AuthorizationModel {
        &self.model
    }

    /// Returns the model identifier.
    pub fn authorization_model_id(&self) -> &str {
        &self.model.id
    }

    /// Gets a type definition by name, using the cache if available.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::TypeNotFound` if the type does not exist.
    pub fn get_type(&self, type_name: &str) -> DomainResult<Arc<TypeDefinition>> {
        if let Some(cached) = self.type_cache.get(type_name) {
            return Ok(Arc::clone(cached.value()));
        }

        let type_def = self
            .model
            .type_definitions
            .iter()
            .find(|td| td.type_name == type_name)
            .ok_or_else(|| DomainError::TypeNotFound {
                type_name: type_name.to_string(),
            })?;

        let type_def_arc = Arc::new(type_def.clone());
        self.type_cache
            .insert(type_name.to_string(), Arc::clone(&type_def_arc));
        Ok(type_def_arc)
    }

    /// Gets a relation definition for a specific type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::TypeNotFound` if the type does not exist.
    /// Returns `DomainError::RelationNotFound` if the relation does not
    /// exist on the type.
    pub fn get_relation(
        &self,
        type_name: &str,
        relation: &str,
    ) -> DomainResult<Arc<RelationDefinition>> {
        let cache_key = format!("{type_name}:{relation}");

        if let Some(cached) = self.relation_cache.get(&cache_key) {
            return Ok(Arc::clone(cached.value()));
        }

        let type_def = self.get_type(type_name)?;

        let relation_def = type_def
            .relations
            .iter()
            .find(|r| r.name == relation)
            .ok_or_else(|| DomainError::RelationNotFound {
                type_name: type_name.to_string(),
                relation: relation.to_string(),
            })?;

        let relation_def_arc = Arc::new(relation_def.clone());
        self.relation_cache
            .insert(cache_key, Arc::clone(&relation_def_arc));
        Ok(relation_def_arc)
    }

    /// Returns the rewrite expression for a relation.
    pub fn rewrite(&self, type_name: &str, relation: &str) -> DomainResult<Userset> {
        Ok(self.get_relation(type_name, relation)?.rewrite.clone())
    }

    /// Returns the user types a relation accepts via stored tuples.
    pub fn directly_related_user_types(
        &self,
        type_name: &str,
        relation: &str,
    ) -> DomainResult<Vec<RelationReference>> {
        Ok(self
            .get_relation(type_name, relation)?
            .directly_related_user_types
            .clone())
    }

    /// Checks if a type exists in the model.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.get_type(type_name).is_ok()
    }

    /// Checks if a relation exists on a type.
    pub fn has_relation(&self, type_name: &str, relation: &str) -> bool {
        self.get_relation(type_name, relation).is_ok()
    }

    /// Returns the number of cached type definitions.
    pub fn type_cache_size(&self) -> usize {
        self.type_cache.len()
    }

    /// Returns the number of cached relation definitions.
    pub fn relation_cache_size(&self) -> usize {
        self.relation_cache.len()
    }
}

/// Source of type systems during resolution.
///
/// Implementations return a shared view per (store, model) pair; the view
/// is read-only for the lifetime of a request.
#[async_trait]
pub trait ModelReader: Send + Sync {
    /// Resolves the type system for a store's authorization model.
    async fn typesystem(
        &self,
        store_id: &str,
        authorization_model_id: &str,
    ) -> DomainResult<Arc<TypeSystem>>;
}

/// In-memory model registry.
///
/// Holds pre-built type systems keyed by (store, model). Useful as the
/// model source in tests and embedded deployments.
#[derive(Debug, Default)]
pub struct StaticModelReader {
    models: DashMap<(String, String), Arc<TypeSystem>>,
}

impl StaticModelReader {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model for a store and returns its type system.
    pub fn register(&self, store_id: &str, model: AuthorizationModel) -> Arc<TypeSystem> {
        let key = (store_id.to_string(), model.id.clone());
        let typesystem = Arc::new(TypeSystem::new(model));
        self.models.insert(key, Arc::clone(&typesystem));
        typesystem
    }
}

#[async_trait]
impl ModelReader for StaticModelReader {
    async fn typesystem(
        &self,
        store_id: &str,
        authorization_model_id: &str,
    ) -> DomainResult<Arc<TypeSystem>> {
        self.models
            .get(&(store_id.to_string(), authorization_model_id.to_string()))
            .map(|ts| Arc::clone(ts.value()))
            .ok_or_else(|| DomainError::AuthorizationModelNotFound {
                store_id: store_id.to_string(),
                model_id: authorization_model_id.to_string(),
            })
    }
}
