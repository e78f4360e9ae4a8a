//! Deterministic client instance identity.
//!
//! Instance ids are `{type}-{host}-{port}`. Colons never appear in an id:
//! they are reserved as the compound-key separator, so IPv6 hosts have their
//! colons replaced with underscores before the id is assembled.

use crate::error::CoreError;
use crate::meta::ClientKind;

/// Replace the characters that are reserved or invalid in instance ids.
#[must_use]
pub fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| match c {
            ':' => '_',
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => c,
            _ => '_',
        })
        .collect()
}

/// Derive the deterministic id for a client instance.
#[must_use]
pub fn generate_instance_id(kind: ClientKind, host: &str, port: u16) -> String {
    format!("{}-{}-{}", kind.as_str(), sanitize_host(host), port)
}

/// Validate a user-supplied instance id.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInstanceId`] when the id is empty, overlong,
/// or contains characters outside `[A-Za-z0-9._-]`.
pub fn validate_instance_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::InvalidInstanceId {
            id: id.to_string(),
            reason: "id must not be empty",
        });
    }
    if id.len() > 128 {
        return Err(CoreError::InvalidInstanceId {
            id: id.to_string(),
            reason: "id exceeds 128 characters",
        });
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(CoreError::InvalidInstanceId {
            id: id.to_string(),
            reason: "only letters, digits, '.', '_' and '-' are allowed",
        });
    }
    Ok(())
}
