//! Authorization model types and the type-system view.

mod type_system;
mod types;

pub use type_system::{ModelReader, StaticModelReader, TypeSystem};
pub use types::{
    AuthorizationModel, RelationDefinition, RelationReference, TypeDefinition, Userset,
};
