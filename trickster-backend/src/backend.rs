//! The cache facade trait: keyed get/put/remove over an opaque byte payload.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::BackendError;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Runtime configuration exposed by a [`Backend`] implementation.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfiguration {
    /// Bodies at or above this size are never cached by the Object engine,
    /// regardless of freshness (spec §4.6 step 8).
    pub max_object_size_bytes: usize,
}

/// Type alias for a dynamically dispatched `Backend` that is `Send + Sync`.
pub type SyncBackend = dyn Backend + Send + Sync;

/// Keyed cache storage contract.
///
/// The payload is opaque: the engines encode/decode `Document` themselves,
/// so a `Backend` implementation never needs to know about HTTP or
/// timeseries semantics — only bytes, keys, and TTLs.
///
/// A TTL of `Duration::ZERO` means "do not expire automatically".
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the raw bytes stored under `key`.
    ///
    /// Returns `Ok(None)` on a cache miss.
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>>;

    /// Store `value` under `key` with the given TTL.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> BackendResult<()>;

    /// Remove `key`, if present. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> BackendResult<()>;

    /// Static configuration of this backend.
    fn configuration(&self) -> CacheConfiguration;
}

#[async_trait]
impl Backend for Arc<SyncBackend> {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> BackendResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        (**self).remove(key).await
    }

    fn configuration(&self) -> CacheConfiguration {
        (**self).configuration()
    }
}
