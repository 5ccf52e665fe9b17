//! In-memory fixtures for exercising both proxy engines without a live
//! upstream or a real cache backend.
//!
//! A `DashMap`-backed fake backend with atomic operation counters, plus a
//! scripted [`OriginClient`] whose responses are queued up by the test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use trickster_backend::{Backend, BackendResult, CacheConfiguration};
use trickster_core::{Extent, ExtentList, TimeRangeQuery, Timeseries, TricksterError};

use crate::error::CacheError;
use crate::origin::OriginClient;

/// An in-memory `(timestamp, value)` series, JSON-marshaled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleSeries {
    /// Unix-second timestamps paired with their sample value, unordered.
    pub points: Vec<(i64, f64)>,
    step_secs: u64,
}

impl SimpleSeries {
    /// Build a series from `(unix_seconds, value)` pairs.
    pub fn new(points: Vec<(i64, f64)>, step: Duration) -> Self {
        Self {
            points,
            step_secs: step.as_secs(),
        }
    }
}

impl Timeseries for SimpleSeries {
    type Error = serde_json::Error;

    fn extents(&self) -> ExtentList {
        if self.points.is_empty() {
            return ExtentList::new();
        }
        let min = self.points.iter().map(|(t, _)| *t).min().unwrap();
        let max = self.points.iter().map(|(t, _)| *t).max().unwrap();
        ExtentList::from_unsorted(vec![Extent::new(at(min), at(max))])
    }

    fn set_extents(&mut self, _extents: ExtentList) {}

    fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    fn set_step(&mut self, step: Duration) {
        self.step_secs = step.as_secs();
    }

    fn value_count(&self) -> usize {
        self.points.len()
    }

    fn timestamp_count(&self) -> usize {
        self.points.len()
    }

    fn copy(&self) -> Self {
        self.clone()
    }

    fn merge(&mut self, _sort_descending: bool, others: &[Self]) {
        let mut by_ts: std::collections::BTreeMap<i64, f64> = self.points.iter().copied().collect();
        for other in others {
            for (t, v) in &other.points {
                by_ts.insert(*t, *v);
            }
        }
        self.points = by_ts.into_iter().collect();
    }

    fn crop_to_range(&mut self, range: Extent) {
        let start = range.start.timestamp();
        let end = range.end.timestamp();
        self.points.retain(|(t, _)| *t >= start && *t <= end);
    }

    fn crop_to_size(&mut self, max_timestamps: usize, boundary_end: DateTime<Utc>, requested: Extent) {
        let boundary = boundary_end.timestamp();
        self.points.retain(|(t, _)| *t <= boundary);
        if self.points.len() <= max_timestamps {
            return;
        }

        let (rs, re) = (requested.start.timestamp(), requested.end.timestamp());
        self.points.sort_by_key(|(t, _)| *t);
        let (inside, mut outside): (Vec<_>, Vec<_>) =
            self.points.drain(..).partition(|(t, _)| *t >= rs && *t <= re);
        outside.sort_by_key(|(t, _)| std::cmp::Reverse(*t));

        let mut kept = inside;
        for point in outside {
            if kept.len() >= max_timestamps {
                break;
            }
            kept.push(point);
        }
        kept.sort_by_key(|(t, _)| *t);
        self.points = kept;
    }

    fn marshal(&self) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(self)
    }

    fn unmarshal(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
}

/// DashMap-backed [`Backend`] fixture with read/write/remove counters.
#[derive(Clone)]
pub struct MockBackend {
    entries: Arc<DashMap<String, Bytes>>,
    max_object_size_bytes: usize,
    pub(crate) reads: Arc<AtomicUsize>,
    pub(crate) writes: Arc<AtomicUsize>,
    pub(crate) removes: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Build an empty mock backend.
    pub fn new(max_object_size_bytes: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_object_size_bytes,
            reads: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
            removes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of completed writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, _ttl: Duration) -> BackendResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key);
        Ok(())
    }

    fn configuration(&self) -> CacheConfiguration {
        CacheConfiguration {
            max_object_size_bytes: self.max_object_size_bytes,
        }
    }
}

/// A scripted [`OriginClient`]: the test queues up responses, then drives
/// requests through an engine and asserts on what comes back.
pub struct MockOriginClient {
    name: String,
    base_url: String,
    query: Mutex<Option<TimeRangeQuery>>,
    fast_forward_url: Mutex<Option<http::Uri>>,
    responses: Mutex<VecDeque<Result<http::Response<Bytes>, CacheError>>>,
    pub(crate) fetch_log: Mutex<Vec<http::Request<Bytes>>>,
}

impl MockOriginClient {
    /// Build a client with no queued responses and no time-range query
    /// (so [`OriginClient::parse_time_range_query`] degrades to uncacheable).
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            query: Mutex::new(None),
            fast_forward_url: Mutex::new(None),
            responses: Mutex::new(VecDeque::new()),
            fetch_log: Mutex::new(Vec::new()),
        }
    }

    /// Make [`OriginClient::parse_time_range_query`] return this query for
    /// every request.
    pub fn with_query(self, query: TimeRangeQuery) -> Self {
        *self.query.lock().unwrap() = Some(query);
        self
    }

    /// Make [`OriginClient::fast_forward_url`] return `Some(url)`.
    pub fn with_fast_forward_url(self, url: http::Uri) -> Self {
        *self.fast_forward_url.lock().unwrap() = Some(url);
        self
    }

    /// Queue one response (or error) to return from the next [`OriginClient::fetch`] call.
    pub fn push_response(&self, response: Result<http::Response<Bytes>, CacheError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Number of `fetch` calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_log.lock().unwrap().len()
    }

    /// Clones of every request passed to `fetch` so far, in order.
    pub fn requests(&self) -> Vec<http::Request<Bytes>> {
        self.fetch_log
            .lock()
            .unwrap()
            .iter()
            .map(crate::http_util::clone_request)
            .collect()
    }
}

#[async_trait]
impl OriginClient for MockOriginClient {
    type Series = SimpleSeries;

    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn derive_cache_key(&self, request: &http::Request<Bytes>, path_config: Option<&str>, extra: &str) -> String {
        format!("{}:{}:{}:{}", self.name, request.uri().path(), path_config.unwrap_or(""), extra)
    }

    fn parse_time_range_query(&self, _request: &http::Request<Bytes>) -> Result<TimeRangeQuery, TricksterError> {
        self.query.lock().unwrap().clone().ok_or(TricksterError::ParseUncacheable)
    }

    fn set_extent(&self, request: &http::Request<Bytes>, extent: Extent) -> http::Request<Bytes> {
        let mut rebuilt = crate::http_util::clone_request(request);
        rebuilt.headers_mut().insert(
            "x-test-extent-start",
            http::HeaderValue::from_str(&extent.start.timestamp().to_string()).unwrap(),
        );
        rebuilt.headers_mut().insert(
            "x-test-extent-end",
            http::HeaderValue::from_str(&extent.end.timestamp().to_string()).unwrap(),
        );
        rebuilt
    }

    fn fast_forward_url(&self, _request: &http::Request<Bytes>) -> Option<http::Uri> {
        self.fast_forward_url.lock().unwrap().clone()
    }

    async fn fetch(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, CacheError> {
        self.fetch_log.lock().unwrap().push(crate::http_util::clone_request(&request));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(http::Response::builder().status(502).body(Bytes::new()).unwrap()))
    }

    fn unmarshal_timeseries(&self, body: &Bytes) -> Result<Self::Series, CacheError> {
        SimpleSeries::unmarshal(body).map_err(|e| TricksterError::CacheCorrupt(e.to_string()).into())
    }

    fn unmarshal_instantaneous(&self, body: &Bytes) -> Result<Self::Series, CacheError> {
        self.unmarshal_timeseries(body)
    }

    fn marshal_timeseries(&self, series: &Self::Series) -> Result<Bytes, CacheError> {
        series
            .marshal()
            .map(Bytes::from)
            .map_err(|e| TricksterError::MarshalFailure(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_to_size_prefers_requested_overlap() {
        let mut series = SimpleSeries::new(
            vec![(0, 1.0), (10, 2.0), (20, 3.0), (30, 4.0)],
            Duration::from_secs(10),
        );
        series.crop_to_size(2, at(30), Extent::new(at(20), at(30)));
        let ts: Vec<i64> = series.points.iter().map(|(t, _)| *t).collect();
        assert_eq!(ts, vec![20, 30]);
    }

    #[test]
    fn merge_prefers_later_argument_on_timestamp_collision() {
        let mut a = SimpleSeries::new(vec![(0, 1.0)], Duration::from_secs(10));
        let b = SimpleSeries::new(vec![(0, 99.0)], Duration::from_secs(10));
        a.merge(true, std::slice::from_ref(&b));
        assert_eq!(a.points, vec![(0, 99.0)]);
    }
}
