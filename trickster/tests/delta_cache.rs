//! End-to-end Delta Proxy Cache scenarios.

use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http::{Request, Response};

use trickster::test_support::{MockBackend, MockOriginClient, SimpleSeries};
use trickster::{
    fetch_via_delta_proxy_cache, Backend, CacheLookupStatus, Extent, LockRegistry, OriginClient, OriginConfig,
    TimeRangeQuery,
};

fn ts(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn request() -> Request<Bytes> {
    Request::builder()
        .method("GET")
        .uri("http://origin.example/query_range")
        .body(Bytes::new())
        .unwrap()
}

fn series_response(points: &[(i64, f64)]) -> Response<Bytes> {
    let series = SimpleSeries::new(points.to_vec(), Duration::from_secs(10));
    let body = Bytes::from(serde_json::to_vec(&series).unwrap());
    Response::builder().status(200).body(body).unwrap()
}

fn origin() -> OriginConfig {
    OriginConfig {
        host: "origin".to_string(),
        name: "origin".to_string(),
        fast_forward_disable: true,
        // Large enough that none of these fixtures' near-epoch-zero test
        // timestamps fall outside the retained window.
        timeseries_retention: 1_000_000_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn full_range_miss_fetches_whole_extent() {
    let backend = MockBackend::new(1024 * 1024);
    let locks = LockRegistry::new();
    let origin = origin();
    let client = MockOriginClient::new("origin", "http://origin.example").with_query(TimeRangeQuery {
        extent: Extent::new(ts(100), ts(200)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    });
    client.push_response(Ok(series_response(&[(100, 1.0), (150, 2.0), (200, 3.0)])));

    let outcome = fetch_via_delta_proxy_cache(&client, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, CacheLookupStatus::KeyMiss);
    assert!(!outcome.was_hit);
    assert_eq!(backend.write_count(), 1);
    assert_eq!(client.fetch_count(), 1);
}

#[tokio::test]
async fn range_miss_is_reported_when_cache_exists_but_does_not_overlap() {
    let backend = MockBackend::new(1024 * 1024);
    let locks = LockRegistry::new();
    let origin = origin();

    let client = MockOriginClient::new("origin", "http://origin.example").with_query(TimeRangeQuery {
        extent: Extent::new(ts(100), ts(150)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    });
    client.push_response(Ok(series_response(&[(100, 1.0), (150, 2.0)])));
    fetch_via_delta_proxy_cache(&client, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    let client2 = MockOriginClient::new("origin", "http://origin.example").with_query(TimeRangeQuery {
        extent: Extent::new(ts(200), ts(300)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    });
    client2.push_response(Ok(series_response(&[(200, 3.0), (300, 4.0)])));

    let outcome = fetch_via_delta_proxy_cache(&client2, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, CacheLookupStatus::RangeMiss);
    assert!(!outcome.was_hit);
}

#[tokio::test]
async fn second_request_with_extended_range_is_a_partial_hit() {
    let backend = MockBackend::new(1024 * 1024);
    let locks = LockRegistry::new();
    let origin = origin();

    let client = MockOriginClient::new("origin", "http://origin.example").with_query(TimeRangeQuery {
        extent: Extent::new(ts(100), ts(200)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    });
    client.push_response(Ok(series_response(&[(100, 1.0), (150, 2.0), (200, 3.0)])));
    fetch_via_delta_proxy_cache(&client, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    let client2 = MockOriginClient::new("origin", "http://origin.example").with_query(TimeRangeQuery {
        extent: Extent::new(ts(100), ts(300)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    });
    client2.push_response(Ok(series_response(&[(210, 4.0), (300, 5.0)])));

    let outcome = fetch_via_delta_proxy_cache(&client2, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, CacheLookupStatus::PartialHit);
    assert!(outcome.was_hit);
    assert_eq!(client2.fetch_count(), 1, "only the gap should be fetched");
}

#[tokio::test]
async fn fully_cached_range_is_a_hit_with_no_upstream_call() {
    let backend = MockBackend::new(1024 * 1024);
    let locks = LockRegistry::new();
    let origin = origin();

    let client = MockOriginClient::new("origin", "http://origin.example").with_query(TimeRangeQuery {
        extent: Extent::new(ts(100), ts(200)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    });
    client.push_response(Ok(series_response(&[(100, 1.0), (200, 2.0)])));
    fetch_via_delta_proxy_cache(&client, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    let client2 = MockOriginClient::new("origin", "http://origin.example").with_query(TimeRangeQuery {
        extent: Extent::new(ts(120), ts(180)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    });

    let outcome = fetch_via_delta_proxy_cache(&client2, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, CacheLookupStatus::Hit);
    assert_eq!(client2.fetch_count(), 0);
}

#[tokio::test]
async fn backfill_tolerance_bounds_the_writeback_but_not_the_fetch_or_response() {
    let backend = MockBackend::new(1024 * 1024);
    let locks = LockRegistry::new();
    let mut origin = origin();
    origin.backfill_tolerance = Duration::from_secs(3600);

    let now_secs = Utc::now().timestamp();
    let query = TimeRangeQuery {
        extent: Extent::new(ts(now_secs - 7200), ts(now_secs)),
        step: Duration::from_secs(10),
        is_offset: false,
        statement: "q".to_string(),
    };
    let client = MockOriginClient::new("origin", "http://origin.example").with_query(query.clone());
    client.push_response(Ok(series_response(&[(now_secs - 7200, 1.0), (now_secs, 2.0)])));

    let outcome = fetch_via_delta_proxy_cache(&client, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();
    assert_eq!(outcome.status, CacheLookupStatus::KeyMiss);

    let sent_requests = client.requests();
    let sent_end: i64 = sent_requests[0]
        .headers()
        .get("x-test-extent-end")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(sent_end, now_secs, "the upstream fetch must still cover the full requested extent");

    let response_body: SimpleSeries = serde_json::from_slice(outcome.response.body()).unwrap();
    let response_max_ts = response_body.points.iter().map(|(t, _)| *t).max().unwrap();
    assert_eq!(response_max_ts, now_secs, "the client-facing response must not be clamped either");

    let key = format!("{}.{}", origin.host, client.derive_cache_key(&request(), None, &query.statement));
    let raw = backend.get(&key).await.unwrap().unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    let body_bytes: Vec<u8> = serde_json::from_value(envelope["body"].clone()).unwrap();
    let cached: SimpleSeries = serde_json::from_slice(&body_bytes).unwrap();
    let cached_max_ts = cached.points.iter().map(|(t, _)| *t).max().unwrap();
    assert!(
        cached_max_ts <= now_secs - 3600,
        "only the cached copy is bounded by the backfill tolerance"
    );
}

#[tokio::test]
async fn degrades_to_pure_proxy_when_not_a_time_range_query() {
    let backend = MockBackend::new(1024 * 1024);
    let locks = LockRegistry::new();
    let origin = origin();
    let client = MockOriginClient::new("origin", "http://origin.example");
    client.push_response(Ok(Response::builder().status(200).body(Bytes::from_static(b"raw")).unwrap()));

    let outcome = fetch_via_delta_proxy_cache(&client, &backend, &locks, &origin, request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, CacheLookupStatus::ProxyOnly);
    assert_eq!(outcome.response.body().as_ref(), b"raw");
    assert_eq!(backend.write_count(), 0);
}
