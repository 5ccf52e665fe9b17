//! Error types for cache backend operations.

use thiserror::Error;

/// Error type for backend operations.
///
/// Categorizes errors that can occur during cache backend interactions into
/// distinct groups for appropriate handling by the engines.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Internal backend error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    InternalError(Box<dyn std::error::Error + Send + Sync>),

    /// Network interaction error.
    ///
    /// Errors occurring during communication with a remote backend.
    #[error(transparent)]
    ConnectionError(Box<dyn std::error::Error + Send + Sync>),
}
