//! tessera-storage: Tuple storage facade
//!
//! This crate provides the read-only storage abstraction the Check
//! resolution core consumes:
//! - TupleReader trait with the three read operations
//! - Tuple-key types and user-reference parsing
//! - In-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              tessera-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs  - TupleReader trait + key types │
//! │  memory.rs  - In-memory implementation      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use traits::{
    split_object, validate_tuple_key, ReadStartingWithUserFilter, ReadUsersetTuplesFilter,
    TupleKey, TupleReader, TupleStream, UserRef, UsersetUserFilter,
};
