//! Top-level application errors. Anything surfacing here aborts startup.

use thiserror::Error;

/// Startup and runtime failures fatal to the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(#[from] peerdeck_config::ConfigError),

    /// A persistence store failed to open.
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    /// The category document could not be loaded.
    #[error("category store error: {0}")]
    Categories(#[from] peerdeck_categories::CategoryError),

    /// Client registration failed (duplicate or invalid instance).
    #[error("client registration error: {0}")]
    Registry(#[from] peerdeck_core::CoreError),

    /// The HTTP listener could not be bound or crashed.
    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}
