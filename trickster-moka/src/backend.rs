//! Moka backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::Expiry;
use moka::future::Cache;
use trickster_backend::{Backend, BackendResult, CacheConfiguration};

/// A stored value paired with the instant it should stop being served.
///
/// `expires_at = None` means the entry was written with a zero TTL and never
/// expires on its own (it can still be evicted for capacity reasons).
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) value: Bytes,
    pub(crate) expires_at: Option<Instant>,
}

/// Expiry policy that reads each entry's own `expires_at`, rather than a
/// single cache-wide TTL. This lets one `MokaBackend` serve both timeseries
/// keys (long TTLs, refreshed on every fast-forward write) and object keys
/// (freshness-lifetime TTLs) side by side.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        created_at: Instant,
    ) -> Option<Duration> {
        value.expires_at.map(|at| at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Always take the new value's expiry, not the old one: a `set()` that
        // extends a key's TTL (e.g. fast-forward refresh) must not be capped
        // by the previous write's deadline.
        value.expires_at.map(|at| at.saturating_duration_since(updated_at))
    }
}

/// In-memory cache backend powered by Moka.
///
/// Serves as the reference [`Backend`] implementation: a single-process,
/// non-persistent store suitable for development and for any deployment that
/// doesn't need a shared cache across multiple proxy instances.
///
/// # Caveats
///
/// - Data is **not persisted** — lost on process restart.
/// - Data is **not shared** across processes.
/// - Expiration is best-effort: expired entries may briefly remain readable
///   until Moka's background eviction runs.
#[derive(Clone)]
pub struct MokaBackend {
    pub(crate) cache: Cache<String, Entry>,
    pub(crate) label: String,
    pub(crate) max_object_size_bytes: usize,
}

impl MokaBackend {
    /// Drives Moka's background maintenance synchronously, so that
    /// [`entry_count`](Self::entry_count) and [`weighted_size`](Self::weighted_size)
    /// reflect eviction/expiry that already should have happened. Intended
    /// for tests; production callers don't need this.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of entries currently stored.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Approximate weighted size in bytes. Only meaningful when built with
    /// [`MokaBackendBuilder::max_bytes`](crate::builder::MokaBackendBuilder::max_bytes).
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }

    /// Starts building a new `MokaBackend`.
    pub fn builder() -> crate::builder::MokaBackendBuilder<crate::builder::NoCapacity> {
        crate::builder::MokaBackendBuilder::new()
    }

    fn record_metrics(&self) {
        crate::metrics::record_capacity(&self.label, self.entry_count(), self.weighted_size());
    }
}

#[async_trait]
impl Backend for MokaBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> BackendResult<()> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.cache
            .insert(key.to_string(), Entry { value, expires_at })
            .await;
        self.record_metrics();
        Ok(())
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.cache.remove(key).await;
        self.record_metrics();
        Ok(())
    }

    fn configuration(&self) -> CacheConfiguration {
        CacheConfiguration {
            max_object_size_bytes: self.max_object_size_bytes,
        }
    }
}
