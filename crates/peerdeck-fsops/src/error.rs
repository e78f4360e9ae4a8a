//! Move orchestration errors.

use thiserror::Error;

/// Errors raised while queueing or executing moves.
#[derive(Debug, Error)]
pub enum MoveError {
    /// A move for this compound key is already queued or running.
    #[error("a move for '{0}' is already in progress")]
    AlreadyQueued(String),

    /// The owning instance is not registered or connected.
    #[error("instance '{0}' is not available")]
    InstanceUnavailable(String),

    /// No destination could be resolved for the category.
    #[error("category '{0}' resolves to no destination path")]
    NoDestination(String),

    /// The copied byte count did not match the source.
    #[error("verification failed for '{path}': expected {expected} bytes, found {found}")]
    VerificationFailed {
        /// Destination that failed verification.
        path: String,
        /// Source byte count.
        expected: u64,
        /// Destination byte count.
        found: u64,
    },

    /// A filesystem operation failed.
    #[error("filesystem operation failed on '{path}': {source}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A native-move delegation never converged.
    #[error("client did not report the new location for '{0}' in time")]
    NativeMoveTimeout(String),

    /// Store or adapter failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
