//! TupleReader trait definition and tuple-key types.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{StorageError, StorageResult};

/// Maximum length for string fields.
const MAX_FIELD_LENGTH: usize = 255;

/// A stream of tuple keys produced by a scan.
///
/// Implementations must stop producing items once the `CancellationToken`
/// passed to the read operation has been cancelled. Callers that abandon a
/// stream simply drop it.
pub type TupleStream = BoxStream<'static, StorageResult<TupleKey>>;

/// A relationship tuple key: (object, relation, user).
///
/// - `object` is `"type:id"` (e.g. `"document:readme"`).
/// - `relation` is an identifier (e.g. `"viewer"`).
/// - `user` is a concrete subject `"type:id"`, a userset reference
///   `"type:id#relation"`, or a typed wildcard `"type:*"`.
///
/// Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    /// The object of the relationship (e.g. "document:readme").
    pub object: String,
    /// The relation between user and object (e.g. "viewer").
    pub relation: String,
    /// The user (subject) of the relationship (e.g. "user:alice").
    pub user: String,
}

impl TupleKey {
    /// Creates a new TupleKey.
    pub fn new(
        object: impl Into<String>,
        relation: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            object: object.into(),
            relation: relation.into(),
            user: user.into(),
        }
    }

    /// Splits the object into its type and id parts.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidInput` if the object is not in
    /// `type:id` format.
    pub fn split_object(&self) -> StorageResult<(&str, &str)> {
        split_object(&self.object)
    }

    /// Parses the user into a typed reference.
    pub fn user_ref(&self) -> StorageResult<UserRef> {
        UserRef::parse(&self.user)
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.user)
    }
}

/// Splits an object string into type and id.
///
/// # Errors
/// Returns `StorageError::InvalidInput` if the value is not in `type:id`
/// format with both parts non-empty.
pub fn split_object(object: &str) -> StorageResult<(&str, &str)> {
    match object.split_once(':') {
        Some((object_type, object_id)) if !object_type.is_empty() && !object_id.is_empty() => {
            Ok((object_type, object_id))
        }
        _ => Err(StorageError::InvalidInput {
            message: format!("object must be in 'type:id' format: '{object}'"),
        }),
    }
}

/// A parsed user reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserRef {
    /// A concrete subject like `user:alice` (also names plain objects when
    /// they appear as the user of a tupleset relation).
    Object { user_type: String, user_id: String },
    /// A userset reference like `group:eng#member`.
    Userset {
        user_type: String,
        user_id: String,
        relation: String,
    },
    /// A typed wildcard like `user:*`.
    Wildcard { user_type: String },
}

impl UserRef {
    /// Parses a user string into a typed reference.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidInput` for empty or malformed values.
    pub fn parse(user: &str) -> StorageResult<Self> {
        let invalid = || StorageError::InvalidInput {
            message: format!("invalid user format: '{user}'"),
        };

        let (base, relation) = match user.split_once('#') {
            Some((base, relation)) => {
                if relation.is_empty() {
                    return Err(invalid());
                }
                (base, Some(relation))
            }
            None => (user, None),
        };

        let (user_type, user_id) = base.split_once(':').ok_or_else(invalid)?;
        if user_type.is_empty() || user_id.is_empty() {
            return Err(invalid());
        }

        match (user_id, relation) {
            ("*", Some(_)) => Err(invalid()),
            ("*", None) => Ok(UserRef::Wildcard {
                user_type: user_type.to_string(),
            }),
            (_, Some(relation)) => Ok(UserRef::Userset {
                user_type: user_type.to_string(),
                user_id: user_id.to_string(),
                relation: relation.to_string(),
            }),
            (_, None) => Ok(UserRef::Object {
                user_type: user_type.to_string(),
                user_id: user_id.to_string(),
            }),
        }
    }

    /// Returns the type portion of the reference.
    pub fn user_type(&self) -> &str {
        match self {
            UserRef::Object { user_type, .. }
            | UserRef::Userset { user_type, .. }
            | UserRef::Wildcard { user_type } => user_type,
        }
    }

    /// Whether this reference is a userset (`type:id#relation`).
    pub fn is_userset(&self) -> bool {
        matches!(self, UserRef::Userset { .. })
    }

    /// Whether this reference is a typed wildcard (`type:*`).
    pub fn is_wildcard(&self) -> bool {
        matches!(self, UserRef::Wildcard { .. })
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Object { user_type, user_id } => write!(f, "{user_type}:{user_id}"),
            UserRef::Userset {
                user_type,
                user_id,
                relation,
            } => write!(f, "{user_type}:{user_id}#{relation}"),
            UserRef::Wildcard { user_type } => write!(f, "{user_type}:*"),
        }
    }
}

/// Which user kinds a userset-tuple scan produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UsersetUserFilter {
    /// Userset references (`type:id#relation`) and typed wildcards
    /// (`type:*`) only. This is what a direct check needs after the exact
    /// point lookup has been tried.
    #[default]
    Indirect,
    /// Every user, including concrete subjects. Tupleset relations store
    /// plain objects as users, so tuple-to-userset scans need this.
    Any,
}

/// Filter for `read_userset_tuples`.
#[derive(Debug, Clone, Default)]
pub struct ReadUsersetTuplesFilter {
    /// The object whose tuples are scanned (e.g. "document:readme").
    pub object: String,
    /// The relation whose tuples are scanned.
    pub relation: String,
    /// Which user kinds to produce.
    pub user_filter: UsersetUserFilter,
}

impl ReadUsersetTuplesFilter {
    /// Filter producing userset references and typed wildcards.
    pub fn indirect(object: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            relation: relation.into(),
            user_filter: UsersetUserFilter::Indirect,
        }
    }

    /// Filter producing every tuple for the (object, relation) pair.
    pub fn any_user(object: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            relation: relation.into(),
            user_filter: UsersetUserFilter::Any,
        }
    }
}

/// Filter for `read_starting_with_user`.
#[derive(Debug, Clone, Default)]
pub struct ReadStartingWithUserFilter {
    /// The object type to scan (e.g. "document").
    pub object_type: String,
    /// The relation to scan.
    pub relation: String,
    /// Users to match, each `"type:id"` or `"type:id#relation"`.
    pub user_filter: Vec<String>,
}

/// Validates a tuple key at the storage layer.
///
/// Structural validation only: field presence and length. Model-level
/// validation (type and relation existence) is the caller's concern.
///
/// # Errors
/// Returns `StorageError::InvalidInput` if any field is empty, too long,
/// or not in the expected format.
pub fn validate_tuple_key(key: &TupleKey) -> StorageResult<()> {
    if key.relation.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "relation cannot be empty".to_string(),
        });
    }
    for (name, value) in [
        ("object", &key.object),
        ("relation", &key.relation),
        ("user", &key.user),
    ] {
        if value.len() > MAX_FIELD_LENGTH {
            return Err(StorageError::InvalidInput {
                message: format!("{name} exceeds maximum length of {MAX_FIELD_LENGTH} characters"),
            });
        }
    }
    split_object(&key.object)?;
    UserRef::parse(&key.user)?;
    Ok(())
}

/// Read-only tuple storage facade.
///
/// Every operation is scoped by a `CancellationToken`; streams stop
/// producing once the token is cancelled. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait TupleReader: Send + Sync {
    /// Point lookup for an exact (object, relation, user) triple.
    ///
    /// Returns `Ok(None)` when no such tuple is stored; absence is data,
    /// not an error. Only meaningful when `tuple_key.user` is a concrete
    /// subject.
    async fn read_user_tuple(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        tuple_key: &TupleKey,
    ) -> StorageResult<Option<TupleKey>>;

    /// Scans tuples for the filter's (object, relation) pair.
    ///
    /// The filter's `user_filter` selects whether only indirect users
    /// (usersets and wildcards) or all users are produced.
    async fn read_userset_tuples(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        filter: ReadUsersetTuplesFilter,
    ) -> StorageResult<TupleStream>;

    /// Reverse scan: all tuples of an object type and relation whose user
    /// matches one of the filter's users. Not used by Check; shared with
    /// the ListObjects side of the facade.
    async fn read_starting_with_user(
        &self,
        cancel: &CancellationToken,
        store_id: &str,
        filter: ReadStartingWithUserFilter,
    ) -> StorageResult<TupleStream>;
}
