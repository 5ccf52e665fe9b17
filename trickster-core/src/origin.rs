//! Per-origin configuration consumed by the proxy engines.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a time-series cache entry is trimmed down to its retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionMethod {
    /// Keep at most `TimeseriesRetention` steps of history, by age.
    Oldest,
    /// Keep at most `TimeseriesRetentionFactor` timestamps, by recency.
    Lru,
}

/// Configuration for a single upstream origin.
///
/// Loaded by the external configuration layer (out of scope here); this
/// struct is the contract both proxy engines read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Upstream host, used as part of the cache-key namespace.
    pub host: String,
    /// Human-readable origin name, used in metrics labels.
    pub name: String,
    /// Origin backend type label (e.g. `"prometheus"`, `"clickhouse"`), used
    /// in metrics labels only — dispatch to the concrete `OriginClient` is
    /// an external concern.
    pub origin_type: String,

    /// Duration near "now" within which data is considered unstable and
    /// must not be cached.
    #[serde(with = "humantime_duration", default)]
    pub backfill_tolerance: Duration,

    /// Eviction strategy for time-series cache entries.
    pub timeseries_eviction_method: EvictionMethod,
    /// `Oldest` eviction: retention window expressed as a step multiplier.
    pub timeseries_retention: i64,
    /// `Lru` eviction: retention window expressed as a timestamp count.
    pub timeseries_retention_factor: usize,
    /// TTL applied to time-series cache writes.
    #[serde(with = "humantime_duration", default)]
    pub timeseries_ttl: Duration,

    /// Disable fast-forward entirely for this origin.
    pub fast_forward_disable: bool,
    /// TTL below which fast-forward is skipped (step must exceed this).
    #[serde(with = "humantime_duration", default)]
    pub fast_forward_ttl: Duration,
    /// Path-config override applied to fast-forward sub-requests.
    pub fast_forward_path: Option<String>,

    /// Multiplier applied to `FreshnessLifetime` when writing a cache entry
    /// that can be revalidated.
    pub revalidation_factor: u32,
    /// Hard cap on any cache-write TTL.
    #[serde(with = "humantime_duration", default)]
    pub max_ttl: Duration,
    /// Status code -> TTL override for otherwise-uncacheable responses.
    pub negative_cache: HashMap<u16, i64>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            name: String::new(),
            origin_type: String::new(),
            backfill_tolerance: Duration::ZERO,
            timeseries_eviction_method: EvictionMethod::Oldest,
            timeseries_retention: 1024,
            timeseries_retention_factor: 1024,
            timeseries_ttl: Duration::from_secs(6 * 3600),
            fast_forward_disable: false,
            fast_forward_ttl: Duration::from_secs(15),
            fast_forward_path: None,
            revalidation_factor: 2,
            max_ttl: Duration::from_secs(86400),
            negative_cache: HashMap::new(),
        }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
