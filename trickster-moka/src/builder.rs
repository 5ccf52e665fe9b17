//! Builder for configuring [`MokaBackend`].

use moka::future::CacheBuilder;
use moka::policy::EvictionPolicy;

use crate::backend::{Entry, MokaBackend, PerEntryExpiry};

/// Marker type: capacity has not been set yet. [`MokaBackendBuilder::build`]
/// is only available once [`max_entries`](MokaBackendBuilder::max_entries) or
/// [`max_bytes`](MokaBackendBuilder::max_bytes) has been called.
pub struct NoCapacity;

/// Marker type: capacity is bounded by entry count.
pub struct EntryCapacity;

/// Marker type: capacity is bounded by total payload bytes.
pub struct ByteCapacity;

/// Builder for creating and configuring a [`MokaBackend`].
///
/// Use [`MokaBackend::builder`](crate::MokaBackend::builder) to obtain one.
pub struct MokaBackendBuilder<Capacity> {
    max_entries: Option<u64>,
    max_bytes: Option<u64>,
    eviction_policy: EvictionPolicy,
    label: String,
    max_object_size_bytes: usize,
    _capacity: std::marker::PhantomData<Capacity>,
}

impl MokaBackendBuilder<NoCapacity> {
    /// Creates a new, unconfigured builder.
    pub fn new() -> Self {
        Self {
            max_entries: None,
            max_bytes: None,
            eviction_policy: EvictionPolicy::tiny_lfu(),
            label: "moka".to_string(),
            max_object_size_bytes: 512 * 1024 * 1024,
            _capacity: std::marker::PhantomData,
        }
    }

    /// Bounds the cache by number of entries. Default eviction policy is
    /// TinyLFU (admission-aware, biased toward frequently-read keys).
    pub fn max_entries(self, max_entries: u64) -> MokaBackendBuilder<EntryCapacity> {
        MokaBackendBuilder {
            max_entries: Some(max_entries),
            max_bytes: self.max_bytes,
            eviction_policy: self.eviction_policy,
            label: self.label,
            max_object_size_bytes: self.max_object_size_bytes,
            _capacity: std::marker::PhantomData,
        }
    }

    /// Bounds the cache by total payload size, weighed by each entry's
    /// [`Bytes`](bytes::Bytes) length plus its key length. Default eviction
    /// policy is LRU.
    pub fn max_bytes(self, max_bytes: u64) -> MokaBackendBuilder<ByteCapacity> {
        MokaBackendBuilder {
            max_entries: self.max_entries,
            max_bytes: Some(max_bytes),
            eviction_policy: EvictionPolicy::lru(),
            label: self.label,
            max_object_size_bytes: self.max_object_size_bytes,
            _capacity: std::marker::PhantomData,
        }
    }
}

impl Default for MokaBackendBuilder<NoCapacity> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Capacity> MokaBackendBuilder<Capacity> {
    /// Sets a label for this backend, used in metrics and debug output.
    ///
    /// Default: `"moka"`.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Overrides the default eviction policy (TinyLFU for entry-based
    /// capacity, LRU for byte-based capacity).
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Bodies at or above this size are rejected by the Object engine before
    /// ever reaching this backend (spec §4.6 step 8); this value is reported
    /// via [`Backend::configuration`](trickster_backend::Backend::configuration)
    /// so the engine can apply that check without querying the backend.
    ///
    /// Default: 512 MiB.
    pub fn max_object_size_bytes(mut self, max_object_size_bytes: usize) -> Self {
        self.max_object_size_bytes = max_object_size_bytes;
        self
    }
}

impl MokaBackendBuilder<EntryCapacity> {
    /// Builds the backend.
    pub fn build(self) -> MokaBackend {
        let cache = CacheBuilder::new(self.max_entries.expect("max_entries set by typestate"))
            .eviction_policy(self.eviction_policy)
            .expire_after(PerEntryExpiry)
            .build();
        MokaBackend {
            cache,
            label: self.label,
            max_object_size_bytes: self.max_object_size_bytes,
        }
    }
}

impl MokaBackendBuilder<ByteCapacity> {
    /// Builds the backend.
    pub fn build(self) -> MokaBackend {
        let cache = CacheBuilder::new(self.max_bytes.expect("max_bytes set by typestate"))
            .weigher(|key: &String, entry: &Entry| -> u32 {
                (key.len() + entry_weigh(entry)).try_into().unwrap_or(u32::MAX)
            })
            .eviction_policy(self.eviction_policy)
            .expire_after(PerEntryExpiry)
            .build();
        MokaBackend {
            cache,
            label: self.label,
            max_object_size_bytes: self.max_object_size_bytes,
        }
    }
}

fn entry_weigh(entry: &Entry) -> usize {
    entry.value.len()
}
