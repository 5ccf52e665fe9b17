//! The injected per-origin strategy both proxy engines fetch through.
//!
//! Every supported upstream backend (Prometheus-like, ClickHouse-like, a
//! plain HTTP object origin, ...) implements this trait once. None of its
//! internals are specified beyond the capability set below — URL shaping,
//! query-dialect parsing, and wire marshaling are external concerns.

use async_trait::async_trait;
use bytes::Bytes;

use trickster_core::{Extent, TimeRangeQuery, Timeseries, TricksterError};

use crate::error::CacheError;

/// Capability set implemented once per supported upstream backend.
///
/// The associated `Series` type ties an `OriginClient` to a concrete
/// [`Timeseries`] representation (columnar arrays, per-metric maps, ...);
/// this is why the trait is generic rather than a trait object — `Timeseries`
/// itself requires `Self: Sized` for `copy`/`merge`, so it cannot be made
/// into a `dyn` value. The engines are generic over `OC: OriginClient`
/// instead, which both call sites (Delta calling Object for fast-forward)
/// instantiate with the same concrete client.
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// The time-series representation this origin produces.
    type Series: Timeseries + Send + 'static;

    /// Human-readable origin name, used in metrics labels.
    fn name(&self) -> &str;

    /// Upstream base URL.
    fn base_url(&self) -> &str;

    /// Derive a deterministic, total cache key from the request's
    /// cache-relevant inputs (method, URL, body hash for POST queries, vary
    /// headers). `path_config` names a path-specific override, when present.
    fn derive_cache_key(
        &self,
        request: &http::Request<Bytes>,
        path_config: Option<&str>,
        extra: &str,
    ) -> String;

    /// Identify the extent and step of a time-series request.
    ///
    /// Returns [`TricksterError::ParseUncacheable`] when the request is not a
    /// time-series query at all — callers should degrade to a pure proxy.
    fn parse_time_range_query(
        &self,
        request: &http::Request<Bytes>,
    ) -> Result<TimeRangeQuery, TricksterError>;

    /// Rewrite the outbound request (URL and/or body) to cover exactly
    /// `extent`, for one fan-out sub-fetch.
    fn set_extent(&self, request: &http::Request<Bytes>, extent: Extent) -> http::Request<Bytes>;

    /// URL that returns only the single newest datapoint, if fast-forward is
    /// supported for this request. `None` disables fast-forward for this
    /// request without it being an error.
    fn fast_forward_url(&self, request: &http::Request<Bytes>) -> Option<http::Uri>;

    /// Perform the upstream HTTP round trip.
    async fn fetch(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, CacheError>;

    /// Decode a full time-series response body in this origin's wire dialect.
    fn unmarshal_timeseries(&self, body: &Bytes) -> Result<Self::Series, CacheError>;

    /// Decode a fast-forward (single-datapoint) response body.
    fn unmarshal_instantaneous(&self, body: &Bytes) -> Result<Self::Series, CacheError>;

    /// Encode a time series back into this origin's wire dialect, for the
    /// downstream response body.
    fn marshal_timeseries(&self, series: &Self::Series) -> Result<Bytes, CacheError>;
}
