//! Cached HTTP object model.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::byte_range::Ranges;

/// A cached HTTP object.
///
/// If `ranges` is set, `body` is the concatenation described by those ranges
/// and the headers carry a matching `Content-Range`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Upstream numeric status code.
    pub status_code: u16,
    /// Upstream status line text (e.g. `"200 OK"`).
    pub status: String,
    /// Response headers, case-sensitive as received.
    pub headers: HashMap<String, String>,
    /// Response body bytes.
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    /// Freshness/revalidation metadata. `None` until a policy has been derived.
    pub caching_policy: Option<CachingPolicy>,
    /// Materialised byte ranges, when this document represents a partial body.
    pub ranges: Option<Ranges>,
}

impl Document {
    /// Build a document from raw response parts, deriving nothing; callers
    /// attach a [`CachingPolicy`] separately (see [`crate::policy`]).
    pub fn new(status_code: u16, status: String, headers: HashMap<String, String>, body: Bytes) -> Self {
        Self {
            status_code,
            status,
            headers,
            body,
            caching_policy: None,
            ranges: None,
        }
    }
}

/// Freshness and revalidation metadata for a cached [`Document`].
///
/// Derived from request headers (client intent) or response headers
/// (server intent) — see [`crate::policy`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachingPolicy {
    /// Client or server requested `no-cache` semantics.
    pub no_cache: bool,
    /// `Cache-Control: no-transform` was present.
    pub no_transform: bool,
    /// Whether the document carries a validator (`ETag` or `Last-Modified`)
    /// that permits conditional revalidation.
    pub can_revalidate: bool,
    /// Timestamp this policy was computed (server's `Date`, or "now" for a
    /// request-side policy).
    pub local_date: DateTime<Utc>,
    /// Seconds the document remains fresh from `local_date`.
    pub freshness_lifetime: i64,
    /// Validator: entity tag.
    pub etag: Option<String>,
    /// Validator: last-modified timestamp.
    pub last_modified: Option<DateTime<Utc>>,

    /// Request-side only: client supplied `If-None-Match`.
    pub if_none_match_value: Option<String>,
    /// Request-side only: client supplied `If-Match`.
    pub if_match_value: Option<String>,
    /// Request-side only: client supplied `If-Modified-Since`.
    pub if_modified_since: Option<DateTime<Utc>>,
    /// Request-side only: client supplied `If-Unmodified-Since`.
    pub if_unmodified_since: Option<DateTime<Utc>>,
    /// Computed downstream-conditional-negotiation outcome. Output field,
    /// not derived directly from headers.
    pub is_fresh: bool,
}

impl CachingPolicy {
    /// `local_date + freshness_lifetime > now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.local_date + chrono::Duration::seconds(self.freshness_lifetime) > now
    }
}

mod bytes_serde {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let v = Vec::<u8>::deserialize(d)?;
        Ok(Bytes::from(v))
    }
}
