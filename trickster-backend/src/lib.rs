#![warn(missing_docs)]

//! Cache facade trait and per-key single-flight lock registry for Trickster.

/// The [`Backend`] cache-facade trait and its supporting types.
pub mod backend;

/// Error types for cache backend operations.
pub mod error;

/// Process-wide per-key single-flight lock registry.
pub mod locks;

/// Backend metrics (requires the `metrics` feature).
pub(crate) mod metrics;

pub use backend::{Backend, BackendResult, CacheConfiguration, SyncBackend};
pub use error::BackendError;
pub use locks::{LockGuard, LockRegistry};
