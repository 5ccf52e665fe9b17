//! Error types shared across the data model.

use thiserror::Error;

/// Errors surfaced by the extent/timeseries/byte-range algebra and the
/// caching-policy deriver.
///
/// Engine-level orchestration errors (upstream failures, backend errors)
/// live in the `trickster` crate; this enum only covers failures that can
/// occur while reasoning about the data model itself.
#[derive(Debug, Error)]
pub enum TricksterError {
    /// The request could not be parsed as a time-range query.
    ///
    /// Not a hard failure: callers should degrade to a pure proxy pass-through.
    #[error("request is not a cacheable time-range query")]
    ParseUncacheable,

    /// A cached document's body could not be decoded as a `Timeseries`.
    #[error("cached document is corrupt: {0}")]
    CacheCorrupt(String),

    /// Serialization of a response for cache writeback failed.
    #[error("failed to marshal timeseries for cache writeback: {0}")]
    MarshalFailure(String),
}
