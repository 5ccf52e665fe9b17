//! Engine-level error type.
//!
//! Wraps the data-model errors from `trickster-core` and the storage errors
//! from `trickster-backend`, and adds the orchestration-level failure modes
//! that only make sense once an upstream fetch is involved.

use bytes::Bytes;
use thiserror::Error;

use trickster_backend::BackendError;
use trickster_core::TricksterError;

/// Error type returned by the Object and Delta proxy cache engines.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A data-model failure: unparseable request, corrupt cached document, or
    /// a marshal failure. See [`TricksterError`] for the exact cause.
    #[error(transparent)]
    Model(#[from] TricksterError),

    /// The cache backend itself failed (storage or connection error).
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The upstream origin responded with a non-success status and no cached
    /// copy was available to fall back on. Propagated to the downstream
    /// client verbatim.
    #[error("upstream responded with status {status}")]
    Upstream {
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body, forwarded as-is.
        body: Bytes,
    },

    /// One fan-out fetch in the Delta engine failed while others succeeded.
    /// The response is still assembled from the data that did arrive.
    #[error("partial upstream failure: {0}")]
    PartialUpstream(String),

    /// The fast-forward sub-request failed. Fast-forward is disabled for
    /// this request; the main response is unaffected.
    #[error("fast-forward fetch failed: {0}")]
    FastForward(String),
}
