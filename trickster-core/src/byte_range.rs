//! HTTP byte-range algebra.

use crate::document::Document;
use serde::{Deserialize, Serialize};

/// A half-open-free (both bounds inclusive) byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive first byte offset. Non-negative.
    pub start: i64,
    /// Inclusive last byte offset. `start <= end`.
    pub end: i64,
}

impl Range {
    /// Build a new byte range.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

/// An ordered, disjoint list of byte [`Range`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranges(pub Vec<Range>);

/// Parse an HTTP `Range: bytes=a-b[, c-d]*` header value.
///
/// Any malformed segment, or a negative start, causes the whole header to be
/// rejected (`None`) rather than partially parsed.
pub fn get_byte_ranges(header: &str) -> Option<Ranges> {
    let rest = header.strip_prefix("bytes=")?;
    if rest.is_empty() {
        return None;
    }

    let mut ranges = Vec::new();
    for segment in rest.split(',') {
        let segment = segment.trim();
        let (start_str, end_str) = segment.split_once('-')?;
        let start: i64 = start_str.trim().parse().ok()?;
        let end: i64 = end_str.trim().parse().ok()?;
        if start < 0 || end < start {
            return None;
        }
        ranges.push(Range::new(start, end));
    }

    if ranges.is_empty() { None } else { Some(Ranges(ranges)) }
}

impl Ranges {
    /// Compute the sub-ranges of `requested` not covered by `self`, the
    /// already-materialised ranges of `cached_doc`.
    ///
    /// Returns `None` when:
    /// - `cached_doc` lacks a well-formed `Content-Length`,
    /// - `cached_doc` is a partial body (carries `Content-Range`) but that
    ///   header is unparseable,
    /// - any requested range falls outside `[0, total)`,
    /// - or `self` already fully covers `requested` (cache hit).
    pub fn calculate_delta(&self, cached_doc: &Document, requested: &Ranges) -> Option<Ranges> {
        let total = parse_content_length(cached_doc)?;

        for r in &requested.0 {
            if r.start < 0 || r.end < r.start || r.end >= total {
                return None;
            }
        }

        let is_partial = cached_doc
            .headers
            .get("Content-Range")
            .map(|s| s.as_str())
            .is_some();

        if !is_partial {
            // The whole body is cached: every in-bounds request is a hit.
            return None;
        }

        // Content-Range must still be well-formed even though we only use
        // the cached materialised ranges (`self`) to compute the delta.
        parse_content_range(cached_doc)?;

        let mut gaps = Vec::new();
        for r in &requested.0 {
            gaps.extend(subtract_covered(*r, &self.0));
        }

        if gaps.is_empty() { None } else { Some(Ranges(gaps)) }
    }
}

/// Subtract the disjoint, sorted `covered` ranges from a single `range`,
/// using discrete (byte-granular) interval arithmetic: the gap immediately
/// following a covered range starts at `covered.end + 1`; the gap
/// immediately preceding one ends at `covered.start - 1`.
fn subtract_covered(range: Range, covered: &[Range]) -> Vec<Range> {
    let mut gaps = Vec::new();
    let mut cursor = range.start;

    let mut sorted: Vec<Range> = covered.to_vec();
    sorted.sort_by_key(|r| r.start);

    for c in &sorted {
        if c.end < range.start || c.start > range.end {
            continue;
        }
        if c.start > cursor {
            let gap_end = std::cmp::min(c.start - 1, range.end);
            if cursor <= gap_end {
                gaps.push(Range::new(cursor, gap_end));
            }
        }
        if c.end + 1 > cursor {
            cursor = c.end + 1;
        }
        if cursor > range.end {
            break;
        }
    }

    if cursor <= range.end {
        gaps.push(Range::new(cursor, range.end));
    }

    gaps
}

fn parse_content_length(doc: &Document) -> Option<i64> {
    doc.headers.get("Content-Length")?.trim().parse().ok()
}

/// Parse `Content-Range: bytes s-e/total`. Returns `None` if missing or malformed.
fn parse_content_range(doc: &Document) -> Option<(i64, i64, i64)> {
    let value = doc.headers.get("Content-Range")?;
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range_part, total_part) = rest.split_once('/')?;
    let (start_str, end_str) = range_part.split_once('-')?;
    let start: i64 = start_str.trim().parse().ok()?;
    let end: i64 = end_str.trim().parse().ok()?;
    let total: i64 = total_part.trim().parse().ok()?;
    Some((start, end, total))
}
