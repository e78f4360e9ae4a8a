//! Category manager errors.

use thiserror::Error;

/// Errors raised by category CRUD and sync.
#[derive(Debug, Error)]
pub enum CategoryError {
    /// The category does not exist.
    #[error("category '{0}' not found")]
    NotFound(String),

    /// A category with this name already exists.
    #[error("category '{0}' already exists")]
    AlreadyExists(String),

    /// The `Default` category cannot be renamed.
    #[error("Cannot rename Default category")]
    CannotRenameDefault,

    /// The `Default` category cannot be deleted.
    #[error("Cannot delete Default category")]
    CannotDeleteDefault,

    /// The `Default` category's priority is client-managed.
    #[error("Cannot change priority of Default category")]
    CannotChangeDefaultPriority,

    /// A color string was not `#RRGGBB`.
    #[error("invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),

    /// Persisting the category document failed.
    #[error("failed to persist categories: {0}")]
    Persist(#[from] std::io::Error),

    /// The stored category document is unreadable.
    #[error("malformed categories document: {0}")]
    Malformed(String),
}
