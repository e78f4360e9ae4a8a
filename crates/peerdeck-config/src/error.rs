//! Configuration error taxonomy. Config errors abort startup.

use thiserror::Error;

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the offending file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or misses required structure.
    #[error("malformed config file {path}: {detail}")]
    Malformed {
        /// Path of the offending file.
        path: String,
        /// Parser detail.
        detail: String,
    },

    /// Two client entries resolve to the same instance identity.
    #[error("duplicate client instance '{instance_id}' (same type, host and port)")]
    DuplicateInstance {
        /// The colliding derived id.
        instance_id: String,
    },

    /// An enabled client entry is missing a required field.
    #[error("client '{instance_id}' is enabled but missing required field '{field}'")]
    MissingClientField {
        /// Instance the entry describes.
        instance_id: String,
        /// The absent field.
        field: &'static str,
    },

    /// An environment variable failed its typed conversion.
    #[error("environment variable {name} is not a valid {expected}: '{value}'")]
    BadEnvValue {
        /// Variable name.
        name: &'static str,
        /// Expected type label.
        expected: &'static str,
        /// Raw value that failed conversion.
        value: String,
    },

    /// Writing the config file back failed.
    #[error("failed to write config file {path}: {source}")]
    WriteFailed {
        /// Path of the target file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
