//! Load and save `config.json` with the environment overlay applied.

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::env::{remove_path_if_equal, EnvOverlay};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, ClientSource};

/// Load configuration from `path`, overlaying the environment.
///
/// A missing file yields typed defaults (first run). Env-sourced client
/// entries are appended unless the file already defines the same identity.
///
/// # Errors
///
/// Fails for unreadable files, malformed JSON, bad env values, duplicate
/// client identities, or enabled clients missing required fields.
pub fn load_config(path: &Path, overlay: &EnvOverlay) -> ConfigResult<AppConfig> {
    let mut doc = if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str::<Value>(&raw).map_err(|err| ConfigError::Malformed {
            path: path.display().to_string(),
            detail: err.to_string(),
        })?
    } else {
        info!(path = %path.display(), "config file absent; starting from defaults");
        Value::Object(serde_json::Map::new())
    };

    overlay.apply(&mut doc)?;

    let mut config: AppConfig =
        serde_json::from_value(doc).map_err(|err| ConfigError::Malformed {
            path: path.display().to_string(),
            detail: err.to_string(),
        })?;

    let env_clients = overlay.client_entries()?;
    for entry in env_clients {
        let id = entry.effective_instance_id();
        let exists = config
            .clients
            .iter()
            .any(|existing| existing.effective_instance_id() == id);
        if exists {
            debug!(instance = ?id, "env client shadowed by config entry");
        } else {
            config.clients.push(entry);
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for entry in &config.clients {
        let Some(id) = entry.effective_instance_id() else {
            if entry.enabled {
                return Err(ConfigError::MissingClientField {
                    instance_id: format!("{}:{}", entry.host, entry.port),
                    field: "type",
                });
            }
            continue;
        };
        if !seen.insert(id.clone()) {
            return Err(ConfigError::DuplicateInstance { instance_id: id });
        }
        if entry.enabled {
            if entry.host.is_empty() {
                return Err(ConfigError::MissingClientField {
                    instance_id: id,
                    field: "host",
                });
            }
            if entry.port == 0 {
                return Err(ConfigError::MissingClientField {
                    instance_id: id,
                    field: "port",
                });
            }
        }
    }
    Ok(())
}

/// Persist configuration to `path`.
///
/// Fields that still equal their environment-derived value are stripped so
/// they re-derive on the next load, and env-sourced client entries are not
/// written at all.
///
/// # Errors
///
/// Fails when serialization or the file write fails.
pub fn save_config(path: &Path, config: &AppConfig, overlay: &EnvOverlay) -> ConfigResult<()> {
    let mut persisted = config.clone();
    persisted
        .clients
        .retain(|entry| entry.source != ClientSource::Env);

    let mut doc = serde_json::to_value(&persisted).map_err(|err| ConfigError::Malformed {
        path: path.display().to_string(),
        detail: err.to_string(),
    })?;

    for (dotted, value) in overlay.derived_values()? {
        remove_path_if_equal(&mut doc, dotted, &value);
    }

    let pretty = serde_json::to_string_pretty(&doc).map_err(|err| ConfigError::Malformed {
        path: path.display().to_string(),
        detail: err.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteFailed {
            path: path.display().to_string(),
            source,
        })?;
    }
    std::fs::write(path, pretty).map_err(|source| ConfigError::WriteFailed {
        path: path.display().to_string(),
        source,
    })
}
