//! Time-range queries and the [`Timeseries`] capability trait.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::extent::{Extent, ExtentList};

/// A parsed time-series range query.
///
/// Produced by an [`OriginClient::parse_time_range_query`](crate::origin::OriginConfig)
/// implementation (out of scope here — the origin-specific query dialect is
/// an external collaborator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRangeQuery {
    /// The requested time range.
    pub extent: Extent,
    /// Sampling period. Must be greater than zero.
    pub step: Duration,
    /// Whether the query is relative to "now" (e.g. "last 5m") as opposed to
    /// tracking an absolute, moving `now` boundary.
    pub is_offset: bool,
    /// Origin-specific query text, opaque to this crate.
    pub statement: String,
}

impl TimeRangeQuery {
    /// Snap `start` down and `end` up to step boundaries.
    pub fn normalize_extent(&mut self) {
        self.extent.start = truncate_to_step(self.extent.start, self.step);
        let truncated_end = truncate_to_step(self.extent.end, self.step);
        self.extent.end = if truncated_end < self.extent.end {
            truncated_end + chrono::Duration::from_std(self.step).unwrap_or_default()
        } else {
            truncated_end
        };
    }

    /// Returns the sub-extents of this query's extent not already covered by
    /// `cached`. See [`ExtentList::calculate_deltas`].
    pub fn calculate_deltas(&self, cached: &ExtentList) -> ExtentList {
        cached.calculate_deltas(self.extent)
    }
}

/// Truncate a timestamp down to the nearest step boundary (epoch-aligned).
pub fn truncate_to_step(t: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_secs = step.as_secs().max(1) as i64;
    let ts = t.timestamp();
    let truncated = ts - ts.rem_euclid(step_secs);
    DateTime::<Utc>::from_timestamp(truncated, 0).unwrap_or(t)
}

/// Capability trait implemented by a backend-specific time-series
/// representation (columnar arrays, per-metric maps, ...).
///
/// Implementations are provided by the origin-specific wire-format adapter;
/// this crate only depends on the trait.
pub trait Timeseries: Send {
    /// Error produced by [`marshal`](Timeseries::marshal) /
    /// [`unmarshal`](Timeseries::unmarshal).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Canonical extents covering exactly the timestamps carrying values.
    fn extents(&self) -> ExtentList;

    /// Replace this series' extents wholesale.
    fn set_extents(&mut self, extents: ExtentList);

    /// Sampling period of this series.
    fn step(&self) -> Duration;

    /// Set this series' sampling period.
    fn set_step(&mut self, step: Duration);

    /// Number of (timestamp, value) pairs across all contained series.
    fn value_count(&self) -> usize;

    /// Number of distinct timestamps present.
    fn timestamp_count(&self) -> usize;

    /// Deep copy.
    fn copy(&self) -> Self
    where
        Self: Sized;

    /// Union on timestamps with `others`. On a duplicate timestamp, the
    /// later argument wins (within one call; a subsequent `merge` call
    /// overrides values set by a prior one). Extents are recomputed as the
    /// canonical union of all contributing extents.
    ///
    /// `sort_descending` controls the merge's internal iteration order, which
    /// only matters for tie-breaking when this series and `others` disagree
    /// about a timestamp with equal "recency" (same convention as upstream
    /// Trickster: pass `true` for cache+fetched merges, `false` when
    /// appending fast-forward data after a crop).
    fn merge(&mut self, sort_descending: bool, others: &[Self])
    where
        Self: Sized;

    /// Retain only values whose timestamp lies in `[range.start, range.end]`;
    /// recompute extents accordingly. Idempotent: `crop(crop(x, e), e) == crop(x, e)`.
    fn crop_to_range(&mut self, range: Extent);

    /// Retain at most `max_timestamps` values, preferring (in order):
    /// values overlapping `requested`, then most-recent values with
    /// timestamp `<= boundary_end`. Values with timestamp `> boundary_end`
    /// are always dropped.
    fn crop_to_size(&mut self, max_timestamps: usize, boundary_end: DateTime<Utc>, requested: Extent);

    /// Serialize to the origin's wire format.
    fn marshal(&self) -> Result<Vec<u8>, Self::Error>;

    /// Deserialize from the origin's wire format.
    fn unmarshal(bytes: &[u8]) -> Result<Self, Self::Error>
    where
        Self: Sized;
}
