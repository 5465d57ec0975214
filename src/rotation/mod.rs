//! # Rotation State
//!
//! Cross-invocation bookkeeping for the `rotate` strategy: which locations
//! are known for a service and where the previous run stopped. The state
//! is an explicit value loaded and persisted by [`store::RotationStore`],
//! never an in-process singleton: each invocation reconciles the cached
//! order with the freshly configured locations and writes the result back.

pub mod store;

pub use store::{PersistenceError, RotationStore};
