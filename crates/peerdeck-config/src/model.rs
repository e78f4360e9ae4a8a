//! Typed schema of `config.json`.

use peerdeck_core::{generate_instance_id, ClientKind};
use serde::{Deserialize, Serialize};

/// Current schema version written to new files.
pub const CONFIG_VERSION: u32 = 2;

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Schema version of the document.
    pub version: u32,
    /// Whether the first-run flow has completed.
    pub first_run_completed: bool,
    /// HTTP/WebSocket server settings.
    pub server: ServerConfig,
    /// Backend client instances.
    pub clients: Vec<ClientEntry>,
    /// Data/log/GeoIP directory roots.
    pub directories: DirectoriesConfig,
    /// Third-party integration settings.
    pub integrations: IntegrationsConfig,
    /// Download history settings.
    pub history: HistoryConfig,
    /// Event scripting hook settings.
    pub event_scripting: EventScriptingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            first_run_completed: false,
            server: ServerConfig::default(),
            clients: Vec::new(),
            directories: DirectoriesConfig::default(),
            integrations: IntegrationsConfig::default(),
            history: HistoryConfig::default(),
            event_scripting: EventScriptingConfig::default(),
        }
    }
}

/// Server bind and auth settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Authentication settings.
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8045,
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// Whether authentication is enforced. When disabled every connection is
    /// treated as an administrator.
    pub enabled: bool,
    /// Admin password. May arrive as plaintext on first run; it is migrated
    /// to a bcrypt hash on first successful login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// HMAC secret for session cookies; generated once and persisted on
    /// first save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
    /// Name of the built-in admin account.
    pub admin_username: String,
    /// Trusted reverse-proxy settings for client-IP extraction.
    pub trusted_proxy: TrustedProxyConfig,
    /// Bcrypt cost used when (re)hashing passwords.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            password: None,
            session_secret: None,
            admin_username: "admin".to_string(),
            trusted_proxy: TrustedProxyConfig::default(),
            bcrypt_cost: 10,
        }
    }
}

/// Trusted proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrustedProxyConfig {
    /// Whether `X-Forwarded-For` from the listed proxies is honoured.
    pub enabled: bool,
    /// Proxy addresses allowed to set forwarding headers.
    pub proxies: Vec<String>,
}

/// Where a client entry came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientSource {
    /// Defined by the user in `config.json`.
    #[default]
    User,
    /// Bootstrapped from prefixed environment variables.
    Env,
}

/// One backend client instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientEntry {
    /// Process-unique id; derived from `type-host-port` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Client kind.
    #[serde(rename = "type")]
    pub kind: Option<ClientKind>,
    /// Human-facing name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// UI accent color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Whether the instance should be connected.
    pub enabled: bool,
    /// Backend host.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Username, for clients that need one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password or connection secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Whether to use TLS towards the backend.
    pub use_ssl: bool,
    /// Where the entry came from.
    pub source: ClientSource,
}

impl Default for ClientEntry {
    fn default() -> Self {
        Self {
            instance_id: None,
            kind: None,
            display_name: None,
            color: None,
            enabled: true,
            host: String::new(),
            port: 0,
            username: None,
            password: None,
            use_ssl: false,
            source: ClientSource::User,
        }
    }
}

impl ClientEntry {
    /// The effective instance id: explicit when set, derived otherwise.
    #[must_use]
    pub fn effective_instance_id(&self) -> Option<String> {
        if let Some(id) = &self.instance_id {
            return Some(id.clone());
        }
        self.kind
            .map(|kind| generate_instance_id(kind, &self.host, self.port))
    }
}

/// Directory roots used by the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoriesConfig {
    /// Data directory (config, databases, categories).
    pub data: String,
    /// Log directory.
    pub logs: String,
    /// GeoIP database directory.
    pub geoip: String,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            data: "./data".to_string(),
            logs: "./data/logs".to_string(),
            geoip: "./data/geoip".to_string(),
        }
    }
}

/// Integration toggles and secrets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationsConfig {
    /// API key accepted by the Torznab endpoint; falls back to the admin
    /// user's key when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torznab_api_key: Option<String>,
}

/// Download history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Whether history recording is on.
    pub enabled: bool,
    /// Days before history rows are pruned.
    pub retention_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 365,
        }
    }
}

/// Event scripting hook settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventScriptingConfig {
    /// Whether events are forwarded to the external sink.
    pub enabled: bool,
    /// Script or command the sink invokes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn effective_id_derives_from_identity_triplet() {
        let entry = ClientEntry {
            kind: Some(ClientKind::Amule),
            host: "::1".to_string(),
            port: 4712,
            ..ClientEntry::default()
        };
        assert_eq!(
            entry.effective_instance_id().unwrap(),
            "amule-__1-4712"
        );

        let explicit = ClientEntry {
            instance_id: Some("my-mule".to_string()),
            ..entry
        };
        assert_eq!(explicit.effective_instance_id().unwrap(), "my-mule");
    }
}
