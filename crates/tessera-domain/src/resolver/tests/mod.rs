//! Resolver test suite.
//!
//! Covers rewrite evaluation (direct, computed userset, tuple-to-userset,
//! union, intersection, difference), contextual tuples, the depth bound,
//! cancellation behavior, and the cached resolver stage.

mod mocks;
