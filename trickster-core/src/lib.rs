#![warn(missing_docs)]

//! Pure data model and algebra for the Trickster caching proxy.
//!
//! This crate has no I/O: it defines the [`Extent`]/[`ExtentList`] interval
//! algebra, the [`Timeseries`] capability trait, the byte-[`Range`]/[`Ranges`]
//! algebra, the [`Document`]/[`CachingPolicy`] cache object model and its
//! derivation from request/response headers, and [`OriginConfig`].

/// Closed time interval algebra: [`Extent`], [`ExtentList`], and the
/// request/cached set-subtraction (`CalculateDeltas`) at the heart of the
/// Delta Proxy Cache engine.
pub mod extent;

/// Time-range query parsing support and the [`Timeseries`] capability trait.
pub mod timeseries;

/// HTTP byte-range algebra: `Range`, `Ranges`, and delta computation against
/// a cached document.
pub mod byte_range;

/// Cached HTTP object model ([`Document`]) and the freshness/caching policy
/// it carries.
pub mod document;

/// Derivation of [`document::CachingPolicy`] from request and response
/// headers (RFC 7234-style freshness rules).
pub mod policy;

/// Per-origin configuration consumed by both proxy engines.
pub mod origin;

/// Error types shared by the data model.
pub mod error;

pub use error::TricksterError;
pub use extent::{Extent, ExtentList};
pub use timeseries::{Timeseries, TimeRangeQuery};
pub use byte_range::{Range, Ranges};
pub use document::{CachingPolicy, Document};
pub use origin::{EvictionMethod, OriginConfig};
