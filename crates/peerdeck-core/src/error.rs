//! Error taxonomy shared by the core building blocks.

use thiserror::Error;

/// Convenience alias for fallible core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the registry, identity, and meta layers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An adapter with the same instance id is already registered.
    #[error("client instance '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The supplied client type is not part of the closed kind set.
    #[error("unknown client type '{0}'")]
    UnknownKind(String),

    /// The instance id contains characters outside the allowed set.
    #[error("invalid instance id '{id}': {reason}")]
    InvalidInstanceId {
        /// Offending identifier.
        id: String,
        /// Why validation rejected it.
        reason: &'static str,
    },

    /// No adapter is registered under the requested instance id.
    #[error("no client instance registered as '{0}'")]
    NotFound(String),

    /// A compound key did not split into `instanceId:hash`.
    #[error("malformed compound key '{0}'")]
    MalformedCompoundKey(String),
}
