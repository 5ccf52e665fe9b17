//! The Delta Proxy Cache engine: time-series range-gap computation, parallel
//! fan-out fetch, merge, crop, retention, and fast-forward.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use trickster_backend::{Backend, LockRegistry};
use trickster_core::origin::EvictionMethod;
use trickster_core::timeseries::truncate_to_step;
use trickster_core::{Extent, ExtentList, OriginConfig, TimeRangeQuery, Timeseries, TricksterError};

use crate::error::CacheError;
use crate::http_util::headers_to_map;
use crate::metrics;
use crate::object::fetch_via_object_proxy_cache;
use crate::origin::OriginClient;
use crate::status::{CacheLookupStatus, FastForwardStatus};

/// Result of [`fetch_via_delta_proxy_cache`].
pub struct DeltaCacheOutcome {
    /// The response to return to the downstream client.
    pub response: http::Response<Bytes>,
    /// Whether any part of the response came from cache.
    pub was_hit: bool,
    /// Detailed result state, for metrics and tests.
    pub status: CacheLookupStatus,
    /// Outcome of the fast-forward sub-request, if attempted.
    pub fast_forward: FastForwardStatus,
}

#[derive(Serialize, Deserialize)]
struct CachedSeries {
    extents: ExtentList,
    step_secs: u64,
    body: Vec<u8>,
}

fn decode_cached<S: Timeseries>(raw: &Bytes) -> Option<S> {
    let cached: CachedSeries = serde_json::from_slice(raw).ok()?;
    let mut series = S::unmarshal(&cached.body).ok()?;
    series.set_extents(cached.extents);
    series.set_step(Duration::from_secs(cached.step_secs));
    Some(series)
}

/// Load and decode the series cached under `key`. A failure to decode either
/// the envelope or the wire-format body purges the entry and is treated the
/// same as nothing having been cached at all, mirroring `load_document`.
async fn load_cached<S: Timeseries, B: Backend>(backend: &B, key: &str) -> Result<Option<S>, CacheError> {
    let Some(raw) = backend.get(key).await? else {
        return Ok(None);
    };
    match decode_cached::<S>(&raw) {
        Some(series) => Ok(Some(series)),
        None => {
            backend.remove(key).await?;
            Ok(None)
        }
    }
}

fn encode_cached<S: Timeseries>(series: &S) -> Result<Bytes, CacheError> {
    let body = series
        .marshal()
        .map_err(|e| TricksterError::MarshalFailure(e.to_string()))?;
    let cached = CachedSeries {
        extents: series.extents(),
        step_secs: series.step().as_secs(),
        body,
    };
    serde_json::to_vec(&cached)
        .map(Bytes::from)
        .map_err(|e| TricksterError::MarshalFailure(e.to_string()).into())
}

/// Point beyond which data must not be written back to cache: timestamps
/// past it are still inside the upstream's unstable window. Only ever
/// restricts the writeback crop — the fetch and the client-facing response
/// always cover the full requested extent.
fn backfill_boundary(query: &TimeRangeQuery, tolerance: Duration) -> DateTime<Utc> {
    if !query.is_offset && !tolerance.is_zero() {
        query.extent.end - chrono::Duration::from_std(tolerance).unwrap_or_default()
    } else {
        query.extent.end
    }
}

fn oldest_retained_timestamp(now: DateTime<Utc>, step: Duration, retention_steps: i64) -> DateTime<Utc> {
    let truncated = truncate_to_step(now, step);
    let window_secs = (step.as_secs() as i64).saturating_mul(retention_steps.max(0));
    truncated - chrono::Duration::seconds(window_secs)
}

/// `normalize(now)`'s end bound: the timestamp a query whose end is "now"
/// would have after snapping to a step boundary.
fn normalize_now_end(now: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let mut now_query = TimeRangeQuery {
        extent: Extent::new(DateTime::<Utc>::from_timestamp(0, 0).unwrap(), now),
        step,
        is_offset: false,
        statement: String::new(),
    };
    now_query.normalize_extent();
    now_query.extent.end
}

fn should_fast_forward(origin: &OriginConfig, query: &TimeRangeQuery, now_end: DateTime<Utc>) -> bool {
    !origin.fast_forward_disable && query.extent.end == now_end && query.step > origin.fast_forward_ttl
}

/// Whether `deltas` is a single gap spanning the whole requested extent, as
/// opposed to a gap within an otherwise partially-cached range.
fn is_full_range_miss(deltas: &ExtentList, requested: Extent) -> bool {
    deltas.0.len() == 1 && deltas.0[0] == requested
}

async fn fetch_extent<OC: OriginClient>(
    client: &OC,
    request: &http::Request<Bytes>,
    extent: Extent,
    step: Duration,
) -> Result<OC::Series, CacheError> {
    let sub_request = client.set_extent(request, extent);
    let response = client.fetch(sub_request).await?;
    let mut series = client.unmarshal_timeseries(response.body())?;
    series.set_extents(ExtentList::from_unsorted(vec![extent]));
    series.set_step(step);
    Ok(series)
}

fn build_response(body: Bytes) -> http::Response<Bytes> {
    http::Response::builder()
        .status(200)
        .header(http::header::CONTENT_TYPE, "application/octet-stream")
        .body(body)
        .unwrap_or_else(|_| http::Response::new(Bytes::new()))
}

async fn run_fast_forward<OC, B>(
    client: &OC,
    backend: &B,
    locks: &LockRegistry,
    origin: &OriginConfig,
    request: &http::Request<Bytes>,
) -> (FastForwardStatus, Option<OC::Series>)
where
    OC: OriginClient,
    B: Backend,
{
    let Some(url) = client.fast_forward_url(request) else {
        return (FastForwardStatus::Off, None);
    };

    let mut ff_request = crate::http_util::clone_request(request);
    *ff_request.uri_mut() = url;

    let outcome = fetch_via_object_proxy_cache(
        client,
        backend,
        locks,
        origin,
        ff_request,
        origin.fast_forward_path.as_deref(),
        true,
    )
    .await;

    match outcome {
        Ok(outcome) if outcome.response.status().is_success() => {
            match client.unmarshal_instantaneous(outcome.response.body()) {
                Ok(series) => (FastForwardStatus::Hit, Some(series)),
                Err(_) => (FastForwardStatus::Err, None),
            }
        }
        _ => (FastForwardStatus::Err, None),
    }
}

/// `FetchViaDeltaProxyCache(request, client, pathConfig?)`.
#[tracing::instrument(skip_all, fields(origin = %origin.name))]
pub async fn fetch_via_delta_proxy_cache<OC, B>(
    client: &OC,
    backend: &B,
    locks: &LockRegistry,
    origin: &OriginConfig,
    request: http::Request<Bytes>,
    path_config: Option<&str>,
) -> Result<DeltaCacheOutcome, CacheError>
where
    OC: OriginClient,
    B: Backend,
{
    let start = Instant::now();
    let path = request.uri().path().to_string();

    let mut query = match client.parse_time_range_query(&request) {
        Ok(q) => q,
        Err(TricksterError::ParseUncacheable) => {
            let response = client.fetch(request).await?;
            metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyOnly, start.elapsed());
            return Ok(DeltaCacheOutcome {
                response,
                was_hit: false,
                status: CacheLookupStatus::ProxyOnly,
                fast_forward: FastForwardStatus::Off,
            });
        }
        Err(e) => return Err(e.into()),
    };

    query.normalize_extent();
    let now = Utc::now();
    let backfill_end = backfill_boundary(&query, origin.backfill_tolerance);

    // Entirely outside the retained window: skip the cache and its lock
    // altogether, proxy straight through.
    if origin.timeseries_eviction_method == EvictionMethod::Oldest {
        let oldest_retained = oldest_retained_timestamp(now, query.step, origin.timeseries_retention);
        if query.extent.end < oldest_retained || query.extent.start > backfill_end {
            let response = client.fetch(request).await?;
            metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyOnly, start.elapsed());
            return Ok(DeltaCacheOutcome {
                response,
                was_hit: false,
                status: CacheLookupStatus::ProxyOnly,
                fast_forward: FastForwardStatus::Off,
            });
        }
    }

    let key = format!("{}.{}", origin.host, client.derive_cache_key(&request, path_config, &query.statement));
    let _guard = locks.acquire(&key).await;

    let request_policy = trickster_core::policy::request_caching_policy(&headers_to_map(request.headers()));
    if request_policy.no_cache {
        backend.remove(&key).await?;
        let series = fetch_extent(client, &request, query.extent, query.step).await?;
        let body = client.marshal_timeseries(&series)?;
        let response = build_response(body);
        metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::Purge, start.elapsed());
        return Ok(DeltaCacheOutcome {
            response,
            was_hit: false,
            status: CacheLookupStatus::Purge,
            fast_forward: FastForwardStatus::Off,
        });
    }

    let cached_series: Option<OC::Series> = load_cached::<OC::Series, B>(backend, &key).await?;

    // Cached, but under Lru retention it has already aged past the point
    // where the requested range could plausibly overlap it: proxy through
    // rather than grow the cache entry for a range it's about to evict.
    if let (Some(series), EvictionMethod::Lru) = (&cached_series, origin.timeseries_eviction_method) {
        let timestamp_count = series.timestamp_count();
        if timestamp_count > 0 && timestamp_count >= origin.timeseries_retention_factor {
            let extents = series.extents();
            let outside_cached_bounds = match (extents.0.first(), extents.0.last()) {
                (Some(first), Some(last)) => query.extent.end < first.start || query.extent.start > last.end,
                _ => false,
            };
            if outside_cached_bounds {
                let response = client.fetch(request).await?;
                metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyOnly, start.elapsed());
                return Ok(DeltaCacheOutcome {
                    response,
                    was_hit: false,
                    status: CacheLookupStatus::ProxyOnly,
                    fast_forward: FastForwardStatus::Off,
                });
            }
        }
    }

    let cache_present = cached_series.is_some();
    let cached_extents = cached_series.as_ref().map(|s| s.extents()).unwrap_or_else(ExtentList::new);
    let deltas = query.calculate_deltas(&cached_extents);

    let status = if !cache_present {
        CacheLookupStatus::KeyMiss
    } else if deltas.is_empty() {
        CacheLookupStatus::Hit
    } else if is_full_range_miss(&deltas, query.extent) {
        CacheLookupStatus::RangeMiss
    } else {
        CacheLookupStatus::PartialHit
    };

    let fetched: Vec<OC::Series> = if deltas.is_empty() {
        Vec::new()
    } else {
        let fetches = deltas.iter().map(|extent| fetch_extent(client, &request, *extent, query.step));
        let results = join_all(fetches).await;
        let mut series = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(s) => series.push(s),
                Err(e) => failures.push(e.to_string()),
            }
        }

        if series.is_empty() && !failures.is_empty() {
            metrics::record_request(&origin.name, &origin.origin_type, &path, CacheLookupStatus::ProxyError, start.elapsed());
            return Err(CacheError::PartialUpstream(failures.join("; ")));
        }
        series
    };

    let mut merged = match cached_series {
        Some(s) => s,
        None => match fetched.first() {
            Some(s) => s.copy(),
            None => {
                return Err(CacheError::Upstream {
                    status: 502,
                    body: Bytes::from_static(b"no data available for requested range"),
                });
            }
        },
    };

    if !fetched.is_empty() {
        if cache_present {
            merged.merge(true, &fetched);
        } else if fetched.len() > 1 {
            merged.merge(true, &fetched[1..]);
        }
    }

    // The response sent to the client and the copy destined for the cache
    // are cropped independently: the client always sees the full requested
    // extent, while the cached copy is bounded by retention and backfill.
    let mut response_series = merged.copy();
    if status != CacheLookupStatus::KeyMiss {
        response_series.crop_to_range(query.extent);
    }

    if status != CacheLookupStatus::Hit {
        match origin.timeseries_eviction_method {
            EvictionMethod::Oldest => {
                let oldest_retained = oldest_retained_timestamp(now, query.step, origin.timeseries_retention);
                merged.crop_to_range(Extent::new(oldest_retained, backfill_end));
            }
            EvictionMethod::Lru => {
                merged.crop_to_size(origin.timeseries_retention_factor, backfill_end, query.extent);
            }
        }
        if !merged.extents().is_empty() {
            let writeback = encode_cached(&merged)?;
            backend.set(&key, writeback, origin.timeseries_ttl).await?;
        }
    }

    let now_end = normalize_now_end(now, query.step);
    let (fast_forward_status, fast_forward_series) = if should_fast_forward(origin, &query, now_end) {
        run_fast_forward(client, backend, locks, origin, &request).await
    } else {
        (FastForwardStatus::Off, None)
    };
    metrics::record_fast_forward(fast_forward_status);

    if let Some(ff) = fast_forward_series {
        response_series.merge(false, std::slice::from_ref(&ff));
    }

    let body = client.marshal_timeseries(&response_series)?;
    let response = build_response(body);

    let was_hit = matches!(status, CacheLookupStatus::Hit | CacheLookupStatus::PartialHit);
    metrics::record_request(&origin.name, &origin.origin_type, &path, status, start.elapsed());

    Ok(DeltaCacheOutcome {
        response,
        was_hit,
        status,
        fast_forward: fast_forward_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn query(start: i64, end: i64, step_secs: u64) -> TimeRangeQuery {
        TimeRangeQuery {
            extent: Extent::new(ts(start), ts(end)),
            step: Duration::from_secs(step_secs),
            is_offset: true,
            statement: "q".to_string(),
        }
    }

    #[test]
    fn backfill_boundary_passes_offset_queries_through_unclamped() {
        let q = query(0, 1000, 10);
        let boundary = backfill_boundary(&q, Duration::from_secs(60));
        assert_eq!(boundary, ts(1000));
        assert_eq!(q.extent.end, ts(1000), "the query's own extent is never mutated");
    }

    #[test]
    fn backfill_boundary_clamps_absolute_queries() {
        let mut q = query(500, 1000, 10);
        q.is_offset = false;
        let boundary = backfill_boundary(&q, Duration::from_secs(60));
        assert_eq!(boundary, ts(940));
        assert_eq!(q.extent.end, ts(1000), "the fetch/response extent stays full-range");
    }

    #[test]
    fn backfill_boundary_ignores_zero_tolerance() {
        let mut q = query(500, 1000, 10);
        q.is_offset = false;
        assert_eq!(backfill_boundary(&q, Duration::ZERO), ts(1000));
    }

    #[test]
    fn oldest_retained_timestamp_uses_step_multiplier() {
        let retained = oldest_retained_timestamp(ts(10_000), Duration::from_secs(100), 50);
        assert_eq!(retained, ts(5_000));
    }

    #[test]
    fn oldest_retained_timestamp_truncates_now_to_a_step_boundary_first() {
        let retained = oldest_retained_timestamp(ts(10_037), Duration::from_secs(100), 0);
        assert_eq!(retained, ts(10_000));
    }

    #[test]
    fn is_full_range_miss_true_for_non_overlapping_cache() {
        let requested = Extent::new(ts(200), ts(300));
        let deltas = ExtentList(vec![requested]);
        assert!(is_full_range_miss(&deltas, requested));
    }

    #[test]
    fn is_full_range_miss_false_for_a_gap_within_a_wider_request() {
        let requested = Extent::new(ts(100), ts(300));
        let deltas = ExtentList(vec![Extent::new(ts(200), ts(300))]);
        assert!(!is_full_range_miss(&deltas, requested));
    }

    #[test]
    fn normalize_now_end_snaps_to_a_step_boundary() {
        assert_eq!(normalize_now_end(ts(197), Duration::from_secs(10)), ts(200));
    }

    #[test]
    fn fast_forward_skipped_when_disabled() {
        let mut origin = OriginConfig::default();
        origin.fast_forward_disable = true;
        let q = query(0, 100, 90);
        assert!(!should_fast_forward(&origin, &q, ts(100)));
    }

    #[test]
    fn fast_forward_skipped_when_extent_end_is_not_now() {
        let origin = OriginConfig::default();
        let q = query(0, 100, 90);
        assert!(!should_fast_forward(&origin, &q, ts(500)));
    }

    #[test]
    fn fast_forward_requires_step_greater_than_ttl() {
        let mut origin = OriginConfig::default();
        origin.fast_forward_ttl = Duration::from_secs(60);
        let slow = query(0, 100, 30);
        assert!(!should_fast_forward(&origin, &slow, ts(100)));

        let fast = query(0, 100, 90);
        assert!(should_fast_forward(&origin, &fast, ts(100)));
    }
}
