//! Closed time interval algebra.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed time interval `[start, end]`.
///
/// `start` must be less than or equal to `end`; construction does not
/// enforce this so that callers can build degenerate extents and observe
/// the invariant failing loudly elsewhere (e.g. in tests), matching the
/// upstream Trickster behaviour of trusting well-formed call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Extent {
    /// Inclusive start of the interval.
    pub start: DateTime<Utc>,
    /// Inclusive end of the interval.
    pub end: DateTime<Utc>,
}

impl Extent {
    /// Build a new extent. Does not validate `start <= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether this extent fully contains `other`.
    pub fn contains(&self, other: &Extent) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Whether `self` and `other` overlap or touch (share a boundary point).
    fn overlaps_or_touches(&self, other: &Extent) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.timestamp(), self.end.timestamp())
    }
}

/// An ordered, disjoint sequence of [`Extent`]s, sorted ascending by `start`.
///
/// Canonical form: no two extents overlap or touch; adjacent extents in the
/// list are separated by at least one step. [`ExtentList::from_unsorted`]
/// restores canonical form after a mutation such as [`Timeseries::merge`](crate::Timeseries::merge).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentList(pub Vec<Extent>);

impl ExtentList {
    /// An empty extent list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a canonical (sorted, merged) extent list from an arbitrary
    /// collection of extents.
    pub fn from_unsorted(mut extents: Vec<Extent>) -> Self {
        extents.sort_by_key(|e| e.start);
        let mut merged: Vec<Extent> = Vec::with_capacity(extents.len());
        for extent in extents {
            match merged.last_mut() {
                Some(last) if last.overlaps_or_touches(&extent) => {
                    if extent.end > last.end {
                        last.end = extent.end;
                    }
                }
                _ => merged.push(extent),
            }
        }
        Self(merged)
    }

    /// Iterate the contained extents in order.
    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.0.iter()
    }

    /// Whether the list contains no extents.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the sub-extents of `requested` that are not already covered
    /// by `self` (the cached extent list).
    ///
    /// The returned list is disjoint, sorted, and contained within
    /// `requested`; its union with `requested ∩ self` equals `requested`.
    pub fn calculate_deltas(&self, requested: Extent) -> ExtentList {
        if self.0.is_empty() {
            return ExtentList(vec![requested]);
        }

        let mut gaps = Vec::new();
        let mut cursor = requested.start;

        for cached in &self.0 {
            if cached.end < requested.start || cached.start > requested.end {
                continue;
            }
            if cached.start > cursor {
                let gap_end = std::cmp::min(cached.start, requested.end);
                if cursor < gap_end {
                    gaps.push(Extent::new(cursor, gap_end));
                }
            }
            if cached.end > cursor {
                cursor = cached.end;
            }
            if cursor >= requested.end {
                break;
            }
        }

        if cursor < requested.end {
            gaps.push(Extent::new(cursor, requested.end));
        }

        ExtentList(gaps)
    }

    /// Deterministic textual form used only for logs/metrics:
    /// `"s1-e1;s2-e2"`.
    pub fn extents_string(&self) -> String {
        self.0
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for ExtentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extents_string())
    }
}

impl From<Vec<Extent>> for ExtentList {
    fn from(v: Vec<Extent>) -> Self {
        ExtentList::from_unsorted(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn ext(s: i64, e: i64) -> Extent {
        Extent::new(ts(s), ts(e))
    }

    #[test]
    fn empty_cache_yields_requested() {
        let cached = ExtentList::new();
        let deltas = cached.calculate_deltas(ext(100, 200));
        assert_eq!(deltas.0, vec![ext(100, 200)]);
    }

    #[test]
    fn full_coverage_yields_nothing() {
        let cached = ExtentList(vec![ext(100, 200)]);
        let deltas = cached.calculate_deltas(ext(120, 180));
        assert!(deltas.is_empty());
    }

    #[test]
    fn single_whole_range_miss() {
        let cached = ExtentList(vec![ext(100, 150)]);
        let deltas = cached.calculate_deltas(ext(200, 300));
        assert_eq!(deltas.0, vec![ext(200, 300)]);
    }

    #[test]
    fn partial_hit_trailing_gap() {
        let cached = ExtentList(vec![ext(100, 150)]);
        let deltas = cached.calculate_deltas(ext(120, 200));
        assert_eq!(deltas.0, vec![ext(150, 200)]);
    }

    #[test]
    fn split_gaps_around_two_cached_ranges() {
        let cached = ExtentList(vec![ext(5, 10), ext(15, 20)]);
        let deltas = cached.calculate_deltas(ext(2, 25));
        assert_eq!(deltas.0, vec![ext(2, 5), ext(10, 15), ext(20, 25)]);
    }

    #[test]
    fn from_unsorted_merges_touching_extents() {
        let list = ExtentList::from_unsorted(vec![ext(10, 20), ext(0, 10), ext(25, 30)]);
        assert_eq!(list.0, vec![ext(0, 20), ext(25, 30)]);
    }

    #[test]
    fn display_matches_log_format() {
        let list = ExtentList(vec![ext(1, 2), ext(3, 4)]);
        assert_eq!(list.to_string(), "1-2;3-4");
    }
}
