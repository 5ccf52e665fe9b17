#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-memory reference [`Backend`](trickster_backend::Backend) built on
//! [`moka`]. Single-process, non-persistent; suitable for a standalone
//! proxy instance or for tests.

mod backend;
mod builder;
pub mod metrics;

pub use backend::MokaBackend;
pub use builder::{ByteCapacity, EntryCapacity, MokaBackendBuilder, NoCapacity};
pub use moka::policy::EvictionPolicy;
