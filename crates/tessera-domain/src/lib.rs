//! tessera-domain: Check resolution core
//!
//! This crate contains the core check resolution logic:
//! - Authorization model types and the type-system view
//! - The recursive check evaluator with parallel combinators
//! - Canonical cache keys for sub-problems
//! - The sub-problem cache and the cache-fronted resolver stage
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               tessera-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  model/     - Model types & TypeSystem view │
//! │  resolver/  - Check evaluation chain        │
//! │  cache/     - Sub-problem cache             │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod model;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use cache::{CheckCache, CheckCacheConfig, CheckResponseCacheEntry};
pub use error::{DomainError, DomainResult};
pub use resolver::{CheckResolver, ResolveCheckRequest, ResolveCheckResponse};
