//! Proxy request metrics.
//!
//! Enable the `metrics` feature to record these. The single counter
//! `trickster_proxy_requests_total` is labeled by `origin`, `origin_type`,
//! `state` (`cached` | `uncached`), and `path`. Per-engine result states
//! (`KeyMiss`, `Hit`, ...) are recorded on a second, more granular counter
//! for dashboards that need the detail; `state` stays coarse on the primary
//! counter so dashboards built against it don't need to track every result
//! variant.

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

use crate::status::{CacheLookupStatus, FastForwardStatus};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total proxied requests, labeled by origin, origin type, cached/
    /// uncached state, and path.
    pub static ref PROXY_REQUEST_ELEMENTS: &'static str = {
        metrics::describe_counter!(
            "trickster_proxy_requests_total",
            "Total proxied requests, labeled by origin, origin type, cached/uncached state, and path."
        );
        "trickster_proxy_requests_total"
    };

    /// Per-engine result state, finer-grained than `cached`/`uncached`.
    pub static ref PROXY_REQUEST_RESULT: &'static str = {
        metrics::describe_counter!(
            "trickster_proxy_request_result_total",
            "Total proxied requests by detailed cache-lookup result state."
        );
        "trickster_proxy_request_result_total"
    };

    /// Request handling latency.
    pub static ref PROXY_REQUEST_DURATION: &'static str = {
        metrics::describe_histogram!(
            "trickster_proxy_request_duration_seconds",
            metrics::Unit::Seconds,
            "Proxy request handling latency in seconds."
        );
        "trickster_proxy_request_duration_seconds"
    };

    /// Fast-forward sub-request outcome (Delta engine only).
    pub static ref FAST_FORWARD_RESULT: &'static str = {
        metrics::describe_counter!(
            "trickster_fast_forward_result_total",
            "Total fast-forward sub-requests by outcome (off, err, hit)."
        );
        "trickster_fast_forward_result_total"
    };
}

fn is_cached(status: CacheLookupStatus) -> bool {
    matches!(
        status,
        CacheLookupStatus::Hit | CacheLookupStatus::PartialHit | CacheLookupStatus::RevalidationHit
    )
}

/// Record one completed proxy request.
#[cfg(feature = "metrics")]
pub fn record_request(
    origin: &str,
    origin_type: &str,
    path: &str,
    status: CacheLookupStatus,
    elapsed: Duration,
) {
    let state = if is_cached(status) { "cached" } else { "uncached" };
    metrics::counter!(
        *PROXY_REQUEST_ELEMENTS,
        "origin" => origin.to_string(),
        "type" => origin_type.to_string(),
        "state" => state,
        "path" => path.to_string()
    )
    .increment(1);
    metrics::counter!(*PROXY_REQUEST_RESULT, "result" => status.to_string()).increment(1);
    metrics::histogram!(*PROXY_REQUEST_DURATION, "result" => status.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record one completed proxy request (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
pub fn record_request(
    _origin: &str,
    _origin_type: &str,
    _path: &str,
    _status: CacheLookupStatus,
    _elapsed: Duration,
) {
}

/// Record a Delta engine fast-forward outcome.
#[cfg(feature = "metrics")]
pub fn record_fast_forward(status: FastForwardStatus) {
    metrics::counter!(*FAST_FORWARD_RESULT, "result" => status.to_string()).increment(1);
}

/// Record a Delta engine fast-forward outcome (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
pub fn record_fast_forward(_status: FastForwardStatus) {}
