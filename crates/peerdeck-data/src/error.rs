//! Typed failures the persistence layer reports to callers.

use thiserror::Error;

/// Errors surfaced by the stores beyond plain query failures.
#[derive(Debug, Error)]
pub enum DataError {
    /// A username failed the `3–32 × [A-Za-z0-9_]` rule.
    #[error("invalid username '{0}': 3-32 characters of letters, digits and underscore")]
    InvalidUsername(String),

    /// A username is already taken (case-insensitive).
    #[error("username '{0}' already exists")]
    UsernameTaken(String),

    /// The referenced user does not exist.
    #[error("user {0} not found")]
    UserNotFound(i64),
}
