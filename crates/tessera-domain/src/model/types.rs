//! Core type definitions for the authorization model.

use std::fmt;

use serde::{Deserialize, Serialize};

use tessera_storage::UserRef;

/// An authorization model: an immutable, versioned artifact per store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationModel {
    /// Model identifier (a ULID).
    pub id: String,
    /// Schema version (e.g., "1.1").
    pub schema_version: String,
    /// Type definitions in the model.
    pub type_definitions: Vec<TypeDefinition>,
}

impl AuthorizationModel {
    /// Creates an empty model.
    pub fn new(id: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema_version: schema_version.into(),
            type_definitions: Vec::new(),
        }
    }

    /// Creates a model with type definitions.
    pub fn with_types(
        id: impl Into<String>,
        schema_version: impl Into<String>,
        type_definitions: Vec<TypeDefinition>,
    ) -> Self {
        Self {
            id: id.into(),
            schema_version: schema_version.into(),
            type_definitions,
        }
    }
}

/// A type definition within the authorization model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// The type name (e.g., "document", "folder").
    pub type_name: String,
    /// Relations defined on this type.
    pub relations: Vec<RelationDefinition>,
}

/// A relation definition on a type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// The relation name.
    pub name: String,
    /// The user types that may be directly assigned via stored tuples.
    /// Empty means the relation places no restriction on direct users.
    pub directly_related_user_types: Vec<RelationReference>,
    /// The rewrite expression for this relation.
    pub rewrite: Userset,
}

/// A reference to the kind of user a relation accepts directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationReference {
    /// A concrete type, e.g. `user`.
    Type(String),
    /// A userset, e.g. `group#member`.
    Userset { type_name: String, relation: String },
    /// A typed wildcard, e.g. `user:*`.
    Wildcard(String),
}

impl RelationReference {
    /// Whether a parsed tuple user is covered by this reference.
    pub fn matches(&self, user: &UserRef) -> bool {
        match (self, user) {
            (RelationReference::Type(type_name), UserRef::Object { user_type, .. }) => {
                type_name == user_type
            }
            (
                RelationReference::Userset {
                    type_name,
                    relation,
                },
                UserRef::Userset {
                    user_type,
                    relation: user_relation,
                    ..
                },
            ) => type_name == user_type && relation == user_relation,
            (RelationReference::Wildcard(type_name), UserRef::Wildcard { user_type }) => {
                type_name == user_type
            }
            _ => false,
        }
    }
}

impl fmt::Display for RelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationReference::Type(type_name) => write!(f, "{type_name}"),
            RelationReference::Userset {
                type_name,
                relation,
            } => write!(f, "{type_name}#{relation}"),
            RelationReference::Wildcard(type_name) => write!(f, "{type_name}:*"),
        }
    }
}

/// A userset rewrite defines how a relation is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Userset {
    /// Direct assignment via stored tuples (this).
    This,
    /// Whoever has another relation on the same object.
    ComputedUserset { relation: String },
    /// For each object reached via the tupleset relation, whoever has the
    /// computed relation on it.
    TupleToUserset {
        tupleset: String,
        computed_userset: String,
    },
    /// Union of multiple usersets.
    Union { children: Vec<Userset> },
    /// Intersection of multiple usersets.
    Intersection { children: Vec<Userset> },
    /// Difference (base minus subtract).
    Difference {
        base: Box<Userset>,
        subtract: Box<Userset>,
    },
}
