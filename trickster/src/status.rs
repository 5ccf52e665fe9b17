//! Result states exposed to metrics and tests.

use std::fmt;

/// Outcome of a cache lookup, shared by both proxy engines.
///
/// Not every variant applies to every engine: `PartialHit`/`RangeMiss` are
/// Delta-only, `RevalidationHit`/`ProxyOnly` are Object-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookupStatus {
    /// Nothing was cached under this key.
    KeyMiss,
    /// The cached entry was used as-is, no upstream call needed.
    Hit,
    /// Delta engine only: part of the requested extent was already cached.
    PartialHit,
    /// Delta engine only: the miss extent equals the whole requested extent.
    RangeMiss,
    /// Object engine only: a stale, revalidatable entry was confirmed fresh
    /// via a conditional upstream request (`304`).
    RevalidationHit,
    /// The request bypassed the cache entirely and was served straight from
    /// upstream, uncached: client `no-cache` on the Object engine, or a
    /// retention/range check on the Delta engine that ruled the request out
    /// of caching before (or instead of) a lock was ever taken.
    ProxyOnly,
    /// The upstream fetch failed and there was no cached data to fall back on.
    ProxyError,
    /// The entry was explicitly removed (stale + non-revalidatable, or an
    /// explicit purge request).
    Purge,
}

impl fmt::Display for CacheLookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::KeyMiss => "kmiss",
            Self::Hit => "hit",
            Self::PartialHit => "phit",
            Self::RangeMiss => "rmiss",
            Self::RevalidationHit => "rhit",
            Self::ProxyOnly => "proxy-only",
            Self::ProxyError => "proxy-error",
            Self::Purge => "purge",
        };
        f.write_str(s)
    }
}

/// Outcome of the Delta engine's fast-forward sub-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastForwardStatus {
    /// Fast-forward was not attempted: disabled, or the step is not greater
    /// than the fast-forward TTL, or the request doesn't track `now`.
    Off,
    /// The fast-forward request failed; the main response proceeds without it.
    Err,
    /// Fast-forward data was fetched and merged into the response.
    Hit,
}

impl fmt::Display for FastForwardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Err => "err",
            Self::Hit => "hit",
        };
        f.write_str(s)
    }
}
