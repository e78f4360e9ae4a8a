//! Auth error taxonomy.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by login, session validation, and the capability gate.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password did not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account exists but is disabled.
    #[error("account is disabled")]
    AccountDisabled,

    /// Session cookie missing, malformed, or signature mismatch.
    #[error("invalid session")]
    InvalidSession,

    /// The caller lacks a required capability.
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// The source IP (or the whole endpoint) is locked out.
    #[error("too many failed attempts; retry after {retry_after}")]
    RateLimited {
        /// When the lockout lifts.
        retry_after: DateTime<Utc>,
    },

    /// A password failed the strength policy.
    #[error("password must be at least 8 characters with a letter, a digit and a symbol")]
    WeakPassword,

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
