//! Environment overlay for `config.json`.
//!
//! A fixed table maps variable names onto dotted config paths with a typed
//! conversion. Sensitive variables override the file; non-sensitive ones
//! only fill paths the file left unset. Prefixed client variables
//! (`AMULE_HOST`, `QBITTORRENT_PORT`, …) bootstrap whole client entries.

use std::collections::HashMap;

use peerdeck_core::ClientKind;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ClientEntry, ClientSource};

/// Typed conversion applied to a variable's raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvValueKind {
    /// Integer value.
    Int,
    /// `true/false/1/0/yes/no`.
    Bool,
    /// Plain string.
    Str,
    /// Comma-separated list of strings.
    Csv,
}

struct EnvSpec {
    name: &'static str,
    path: &'static str,
    kind: EnvValueKind,
    sensitive: bool,
}

const ENV_TABLE: &[EnvSpec] = &[
    EnvSpec { name: "PEERDECK_HOST", path: "server.host", kind: EnvValueKind::Str, sensitive: false },
    EnvSpec { name: "PEERDECK_PORT", path: "server.port", kind: EnvValueKind::Int, sensitive: false },
    EnvSpec { name: "PEERDECK_AUTH_ENABLED", path: "server.auth.enabled", kind: EnvValueKind::Bool, sensitive: false },
    EnvSpec { name: "PEERDECK_AUTH_PASSWORD", path: "server.auth.password", kind: EnvValueKind::Str, sensitive: true },
    EnvSpec { name: "PEERDECK_SESSION_SECRET", path: "server.auth.sessionSecret", kind: EnvValueKind::Str, sensitive: true },
    EnvSpec { name: "PEERDECK_ADMIN_USERNAME", path: "server.auth.adminUsername", kind: EnvValueKind::Str, sensitive: false },
    EnvSpec { name: "PEERDECK_BCRYPT_COST", path: "server.auth.bcryptCost", kind: EnvValueKind::Int, sensitive: false },
    EnvSpec { name: "PEERDECK_TRUSTED_PROXY_ENABLED", path: "server.auth.trustedProxy.enabled", kind: EnvValueKind::Bool, sensitive: false },
    EnvSpec { name: "PEERDECK_TRUSTED_PROXIES", path: "server.auth.trustedProxy.proxies", kind: EnvValueKind::Csv, sensitive: false },
    EnvSpec { name: "PEERDECK_DATA_DIR", path: "directories.data", kind: EnvValueKind::Str, sensitive: false },
    EnvSpec { name: "PEERDECK_LOG_DIR", path: "directories.logs", kind: EnvValueKind::Str, sensitive: false },
    EnvSpec { name: "PEERDECK_GEOIP_DIR", path: "directories.geoip", kind: EnvValueKind::Str, sensitive: false },
    EnvSpec { name: "PEERDECK_TORZNAB_API_KEY", path: "integrations.torznabApiKey", kind: EnvValueKind::Str, sensitive: true },
    EnvSpec { name: "PEERDECK_HISTORY_ENABLED", path: "history.enabled", kind: EnvValueKind::Bool, sensitive: false },
    EnvSpec { name: "PEERDECK_HISTORY_RETENTION_DAYS", path: "history.retentionDays", kind: EnvValueKind::Int, sensitive: false },
    EnvSpec { name: "PEERDECK_EVENT_SCRIPTING_ENABLED", path: "eventScripting.enabled", kind: EnvValueKind::Bool, sensitive: false },
    EnvSpec { name: "PEERDECK_EVENT_SCRIPT", path: "eventScripting.scriptPath", kind: EnvValueKind::Str, sensitive: false },
];

/// Snapshot of the process environment used during load/save.
///
/// Carrying the variables as data keeps the loader deterministic under test.
#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    vars: HashMap<String, String>,
}

impl EnvOverlay {
    /// Capture the live process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build an overlay from explicit pairs (tests, embedding).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Apply the fixed table onto a raw config document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadEnvValue`] when a variable fails its typed
    /// conversion.
    pub fn apply(&self, doc: &mut Value) -> ConfigResult<()> {
        for spec in ENV_TABLE {
            let Some(raw) = self.get(spec.name) else {
                continue;
            };
            let parsed = parse_value(spec, raw)?;
            if spec.sensitive || lookup(doc, spec.path).is_none() {
                set_path(doc, spec.path, parsed);
            }
        }
        Ok(())
    }

    /// Values the overlay would write, used to strip env-derived fields on
    /// save.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadEnvValue`] when a variable fails conversion.
    pub fn derived_values(&self) -> ConfigResult<Vec<(&'static str, Value)>> {
        let mut out = Vec::new();
        for spec in ENV_TABLE {
            if let Some(raw) = self.get(spec.name) {
                out.push((spec.path, parse_value(spec, raw)?));
            }
        }
        Ok(out)
    }

    /// Bootstrap env-sourced client entries from prefixed variables.
    ///
    /// A client is created when `<TYPE>_HOST` is present; `<TYPE>_PORT`,
    /// `<TYPE>_USERNAME`, `<TYPE>_PASSWORD`, and `<TYPE>_ENABLED` refine it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadEnvValue`] for unparseable ports.
    pub fn client_entries(&self) -> ConfigResult<Vec<ClientEntry>> {
        let mut entries = Vec::new();
        for kind in ClientKind::ALL {
            let prefix = kind.as_str().to_ascii_uppercase();
            let Some(host) = self.get(&format!("{prefix}_HOST")) else {
                continue;
            };
            let port = match self.vars.get(&format!("{prefix}_PORT")) {
                Some(raw) if !raw.is_empty() => {
                    raw.parse::<u16>().map_err(|_| ConfigError::BadEnvValue {
                        name: default_port_var(kind),
                        expected: "int",
                        value: raw.clone(),
                    })?
                }
                _ => default_port(kind),
            };
            let enabled = self
                .get(&format!("{prefix}_ENABLED"))
                .map_or(true, |raw| parse_bool(raw).unwrap_or(true));
            entries.push(ClientEntry {
                instance_id: None,
                kind: Some(kind),
                display_name: None,
                color: None,
                enabled,
                host: host.to_string(),
                port,
                username: self.get(&format!("{prefix}_USERNAME")).map(str::to_string),
                password: self.get(&format!("{prefix}_PASSWORD")).map(str::to_string),
                use_ssl: self
                    .get(&format!("{prefix}_USE_SSL"))
                    .and_then(parse_bool)
                    .unwrap_or(false),
                source: ClientSource::Env,
            });
        }
        Ok(entries)
    }
}

const fn default_port(kind: ClientKind) -> u16 {
    match kind {
        ClientKind::Amule => 4712,
        ClientKind::QBittorrent => 8080,
        ClientKind::RTorrent => 8000,
    }
}

const fn default_port_var(kind: ClientKind) -> &'static str {
    match kind {
        ClientKind::Amule => "AMULE_PORT",
        ClientKind::QBittorrent => "QBITTORRENT_PORT",
        ClientKind::RTorrent => "RTORRENT_PORT",
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_value(spec: &EnvSpec, raw: &str) -> ConfigResult<Value> {
    match spec.kind {
        EnvValueKind::Int => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| ConfigError::BadEnvValue {
                name: spec.name,
                expected: "int",
                value: raw.to_string(),
            }),
        EnvValueKind::Bool => parse_bool(raw)
            .map(Value::from)
            .ok_or_else(|| ConfigError::BadEnvValue {
                name: spec.name,
                expected: "bool",
                value: raw.to_string(),
            }),
        EnvValueKind::Str => Ok(Value::from(raw)),
        EnvValueKind::Csv => Ok(Value::from(
            raw.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(Value::from)
                .collect::<Vec<_>>(),
        )),
    }
}

/// Read a dotted path out of a JSON document.
pub(crate) fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a dotted path into a JSON document, creating objects along the way.
pub(crate) fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    for (index, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("object ensured above");
        if index == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return;
        }
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Remove a dotted path from a JSON document when its value equals `expected`.
pub(crate) fn remove_path_if_equal(doc: &mut Value, path: &str, expected: &Value) {
    let Some((parent_path, leaf)) = path.rsplit_once('.') else {
        if let Some(map) = doc.as_object_mut() {
            if map.get(path) == Some(expected) {
                map.remove(path);
            }
        }
        return;
    };
    let mut current = Some(doc);
    for segment in parent_path.split('.') {
        current = current
            .and_then(Value::as_object_mut)
            .and_then(|map| map.get_mut(segment));
    }
    if let Some(parent) = current.and_then(Value::as_object_mut) {
        if parent.get(leaf) == Some(expected) {
            parent.remove(leaf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensitive_env_wins_over_file() {
        let overlay = EnvOverlay::from_pairs([
            ("PEERDECK_AUTH_PASSWORD", "from-env"),
            ("PEERDECK_PORT", "9000"),
        ]);
        let mut doc = json!({
            "server": {
                "port": 8045,
                "auth": { "password": "from-file" }
            }
        });
        overlay.apply(&mut doc).unwrap();
        // Sensitive: env replaces the file value.
        assert_eq!(doc["server"]["auth"]["password"], "from-env");
        // Non-sensitive: the file keeps its value.
        assert_eq!(doc["server"]["port"], 8045);
    }

    #[test]
    fn non_sensitive_env_fills_gaps() {
        let overlay = EnvOverlay::from_pairs([("PEERDECK_PORT", "9000")]);
        let mut doc = json!({});
        overlay.apply(&mut doc).unwrap();
        assert_eq!(doc["server"]["port"], 9000);
    }

    #[test]
    fn csv_values_split() {
        let overlay =
            EnvOverlay::from_pairs([("PEERDECK_TRUSTED_PROXIES", "10.0.0.1, 10.0.0.2,")]);
        let mut doc = json!({});
        overlay.apply(&mut doc).unwrap();
        assert_eq!(
            doc["server"]["auth"]["trustedProxy"]["proxies"],
            json!(["10.0.0.1", "10.0.0.2"])
        );
    }

    #[test]
    fn bad_int_is_rejected() {
        let overlay = EnvOverlay::from_pairs([("PEERDECK_PORT", "not-a-port")]);
        let mut doc = json!({});
        assert!(matches!(
            overlay.apply(&mut doc),
            Err(ConfigError::BadEnvValue { .. })
        ));
    }

    #[test]
    fn prefixed_vars_bootstrap_clients() {
        let overlay = EnvOverlay::from_pairs([
            ("AMULE_HOST", "mule.lan"),
            ("AMULE_PASSWORD", "secret"),
            ("QBITTORRENT_HOST", "qb.lan"),
            ("QBITTORRENT_PORT", "9090"),
            ("QBITTORRENT_ENABLED", "false"),
        ]);
        let clients = overlay.client_entries().unwrap();
        assert_eq!(clients.len(), 2);

        let amule = clients.iter().find(|c| c.kind == Some(ClientKind::Amule)).unwrap();
        assert_eq!(amule.port, 4712);
        assert_eq!(amule.password.as_deref(), Some("secret"));
        assert_eq!(amule.source, ClientSource::Env);
        assert!(amule.enabled);

        let qb = clients
            .iter()
            .find(|c| c.kind == Some(ClientKind::QBittorrent))
            .unwrap();
        assert_eq!(qb.port, 9090);
        assert!(!qb.enabled);
    }

    #[test]
    fn remove_path_only_when_equal() {
        let mut doc = json!({"server": {"host": "env-host", "port": 1}});
        remove_path_if_equal(&mut doc, "server.host", &json!("env-host"));
        remove_path_if_equal(&mut doc, "server.port", &json!(99));
        assert!(doc["server"].get("host").is_none());
        assert_eq!(doc["server"]["port"], 1);
    }
}
