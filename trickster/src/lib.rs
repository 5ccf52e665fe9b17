#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Engine-level error type wrapping data-model and backend failures.
pub mod error;

/// Result states exposed to metrics and tests.
pub mod status;

/// The injected per-origin strategy both proxy engines fetch through.
pub mod origin;

/// Proxy request metrics (requires the `metrics` feature for recording;
/// always compiles).
pub mod metrics;

/// Conversions between `http` types and the plain maps the data model uses.
mod http_util;

/// The Object Proxy Cache engine.
pub mod object;

/// The Delta Proxy Cache engine.
pub mod delta;

/// In-memory [`trickster_core::Timeseries`] and scripted [`OriginClient`]
/// fixtures, for exercising both engines without a live upstream.
///
/// Gated behind the `test-support` feature (rather than plain `#[cfg(test)]`)
/// so integration tests under `tests/` can reach it too.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::CacheError;
pub use origin::OriginClient;
pub use status::{CacheLookupStatus, FastForwardStatus};

pub use delta::{fetch_via_delta_proxy_cache, DeltaCacheOutcome};
pub use object::{fetch_via_object_proxy_cache, ObjectCacheOutcome};

pub use trickster_backend::{Backend, BackendError, CacheConfiguration, LockGuard, LockRegistry};
pub use trickster_core::{
    CachingPolicy, Document, EvictionMethod, Extent, ExtentList, OriginConfig, Range, Ranges,
    TimeRangeQuery, Timeseries, TricksterError,
};
