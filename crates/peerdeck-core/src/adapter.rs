//! The adapter contract implemented once per client kind.
//!
//! Every cross-client caller goes through [`ClientAdapter`]; the adapter
//! encapsulates the wire dialect of its backend. Operations a client cannot
//! perform keep the default implementation, which reports lack of support.

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::{Peer, UnifiedItem, UnifiedPriority};
use crate::meta::ClientKind;

/// Identity triplet attached to an adapter by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Process-unique instance id.
    pub instance_id: String,
    /// Client kind.
    pub kind: ClientKind,
    /// Human-facing name used in logs and the UI.
    pub display_name: String,
}

/// An upload slot reported by a client: a peer plus the item it receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    /// Hash of the item being uploaded, when the client attributes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// The receiving peer.
    pub peer: Peer,
}

/// The result of one poll: everything the pipeline ingests from an instance.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// Items in the download list, stamped with the instance id.
    pub downloads: Vec<UnifiedItem>,
    /// Items advertised as shared. Clients without a distinct shared concept
    /// return the download list here.
    pub shared_files: Vec<UnifiedItem>,
    /// Active upload slots; empty for clients without an upload list.
    pub uploads: Vec<UploadSlot>,
}

/// Options accompanying an add operation.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// App-level category to assign.
    pub category: Option<String>,
    /// Priority to apply after admission.
    pub priority: Option<UnifiedPriority>,
    /// Whether the item should start paused.
    pub paused: bool,
    /// Explicit save path override.
    pub save_path: Option<String>,
}

/// Parameters of a delete operation.
#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    /// Whether payload files should be removed as well.
    pub delete_files: bool,
    /// Whether the item is a shared file rather than a download.
    pub is_shared: bool,
    /// Known on-client path of the payload, when the caller has one.
    pub file_path: Option<String>,
}

/// Outcome of a delete operation.
#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    /// Whether the client accepted the removal.
    pub success: bool,
    /// Paths the core must delete from disk itself (clients whose API cannot
    /// remove payload files).
    pub paths_to_delete: Vec<String>,
}

/// Category payload pushed to clients during sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpec {
    /// Unique category name.
    pub name: String,
    /// Destination path for the owning client, after mapping resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Free-form comment.
    #[serde(default)]
    pub comment: String,
    /// Hex `#RRGGBB` color.
    #[serde(default)]
    pub color: String,
    /// Unified priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<UnifiedPriority>,
}

/// Result of ensuring a category exists on a client.
#[derive(Debug, Clone, Default)]
pub struct EnsureCategoryOutcome {
    /// Native numeric id assigned by ed2k clients.
    pub amule_id: Option<u32>,
}

/// Result of editing a category on a client, with readback verification.
#[derive(Debug, Clone, Default)]
pub struct CategoryEditOutcome {
    /// Whether the readback matched the requested values.
    pub verified: bool,
    /// Fields whose readback disagreed with the request.
    pub mismatches: Vec<String>,
}

/// Transfer telemetry extracted from a raw stats payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetrics {
    /// Upload speed in bytes per second.
    pub upload_speed: u64,
    /// Download speed in bytes per second.
    pub download_speed: u64,
    /// Session upload total in bytes.
    pub upload_total: u64,
    /// Session download total in bytes.
    pub download_total: u64,
    /// Daemon process id, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Traffic-light health of a client's network connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkHealth {
    /// Connected with an open listen port.
    Green,
    /// Connected but firewalled or low-id.
    Yellow,
    /// Not connected.
    Red,
}

/// Network connectivity summary for an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Traffic-light status.
    pub status: NetworkHealth,
    /// Human-readable detail.
    pub text: String,
    /// Whether the listen port is reachable.
    pub port_open: bool,
    /// The listen port, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
}

/// A file inside a multi-file item (or the single payload file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFile {
    /// Path relative to the item root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Completion in `0.0..=1.0`.
    pub progress: f64,
}

/// One entry in an ed2k server list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Server display name.
    pub name: String,
    /// Server address.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Users currently connected, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<u64>,
    /// Files indexed, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<u64>,
    /// Whether this is the server we are connected to.
    #[serde(default)]
    pub connected: bool,
}

/// Search request proxied to ed2k clients.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Free-text query.
    pub text: String,
    /// Optional file-type filter.
    pub file_type: Option<String>,
    /// Minimum size filter in bytes.
    pub min_size: Option<u64>,
    /// Maximum size filter in bytes.
    pub max_size: Option<u64>,
}

/// One search hit returned by an ed2k client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Content hash.
    pub hash: String,
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Known sources.
    pub sources: u32,
    /// Sources with the complete file.
    pub complete_sources: u32,
}

/// Behaviour contract for one backend client instance.
///
/// `fetch_data` is the only data ingress; mutations travel through the typed
/// methods below. Transient transport failures never escape `fetch_data` —
/// the adapter marks itself disconnected and schedules its own reconnect.
#[async_trait]
pub trait ClientAdapter: Send + Sync {
    /// Kind of the backing client.
    fn kind(&self) -> ClientKind;

    /// Identity attached at registration.
    fn identity(&self) -> ClientIdentity;

    /// Whether the instance is enabled in configuration.
    fn is_enabled(&self) -> bool;

    /// Whether a live connection is established.
    fn is_connected(&self) -> bool;

    /// Open the connection and run a cheap version check. Idempotent against
    /// concurrent callers: when a connect is already in progress the call
    /// returns early with the current state.
    async fn init_client(&self) -> anyhow::Result<bool>;

    /// Tear down the connection and stop background tasks.
    async fn shutdown(&self);

    /// Poll the full instance state. Every returned record is stamped with
    /// this adapter's instance id.
    async fn fetch_data(&self, categories_hint: &[CategorySpec]) -> anyhow::Result<FetchBatch>;

    /// Pause a transfer.
    async fn pause(&self, hash: &str) -> anyhow::Result<()>;

    /// Resume a paused transfer.
    async fn resume(&self, hash: &str) -> anyhow::Result<()>;

    /// Stop a transfer. Clients with `stop_replaces_pause` route pause here.
    async fn stop(&self, hash: &str) -> anyhow::Result<()>;

    /// Add a download from a magnet URI.
    async fn add_magnet(&self, uri: &str, opts: &AddOptions) -> anyhow::Result<String> {
        let _ = (uri, opts);
        bail!("magnet links are not supported by this client");
    }

    /// Add a download from raw `.torrent` bytes.
    async fn add_torrent_raw(&self, bytes: &[u8], opts: &AddOptions) -> anyhow::Result<String> {
        let _ = (bytes, opts);
        bail!("torrent files are not supported by this client");
    }

    /// Start a download from a previous search result (ed2k only).
    async fn add_search_result(&self, hash: &str, category_id: Option<u32>) -> anyhow::Result<()> {
        let _ = (hash, category_id);
        bail!("search downloads are not supported by this client");
    }

    /// Add a download from an `ed2k://` link (ed2k only).
    async fn add_ed2k_link(&self, link: &str, category_id: Option<u32>) -> anyhow::Result<String> {
        let _ = (link, category_id);
        bail!("ed2k links are not supported by this client");
    }

    /// Assign an app-level category (native category/label) to an item.
    async fn set_category(
        &self,
        hash: &str,
        category: &str,
        priority: Option<UnifiedPriority>,
    ) -> anyhow::Result<()>;

    /// Remove an item, optionally with its payload files.
    async fn delete_item(&self, hash: &str, request: &DeleteRequest)
        -> anyhow::Result<DeleteOutcome>;

    /// Point an item at a new directory (native move).
    async fn update_directory(&self, hash: &str, path: &str) -> anyhow::Result<()> {
        let _ = (hash, path);
        bail!("directory updates are not supported by this client");
    }

    /// List the files of an item.
    async fn get_files(&self, hash: &str) -> anyhow::Result<Vec<ClientFile>>;

    /// Re-scan the shared files list (ed2k only).
    async fn refresh_shared_files(&self) -> anyhow::Result<()> {
        bail!("shared file refresh is not supported by this client");
    }

    /// Run an interactive search (ed2k only).
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<SearchResult>> {
        let _ = query;
        bail!("search is not supported by this client");
    }

    /// Native categories/labels currently configured on the client, used to
    /// seed the app-wide set during connect-time sync.
    async fn native_categories(&self) -> anyhow::Result<Vec<CategorySpec>> {
        Ok(Vec::new())
    }

    /// The client's default download directory, used as the `Default`
    /// category's translation root.
    async fn default_directory(&self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    /// Make sure a category exists natively, creating it when missing.
    async fn ensure_category_exists(
        &self,
        spec: &CategorySpec,
    ) -> anyhow::Result<EnsureCategoryOutcome>;

    /// Batch form of [`ClientAdapter::ensure_category_exists`]; one call per
    /// sync pass regardless of category count.
    async fn ensure_categories_batch(&self, specs: &[CategorySpec]) -> anyhow::Result<()>;

    /// Edit a native category and verify the change by readback.
    async fn edit_category(&self, spec: &CategorySpec) -> anyhow::Result<CategoryEditOutcome>;

    /// Rename a native category.
    async fn rename_category(&self, old_name: &str, new_name: &str) -> anyhow::Result<()>;

    /// Delete a native category.
    async fn delete_category(&self, name: &str) -> anyhow::Result<()>;

    /// Resolve the native numeric id for a category name (ed2k only).
    async fn ensure_amule_category_id(&self, name: &str) -> anyhow::Result<u32> {
        let _ = name;
        bail!("numeric category ids are not supported by this client");
    }

    /// Raw statistics payload from the client.
    async fn get_stats(&self) -> anyhow::Result<Value>;

    /// Extract transfer telemetry from a raw stats payload.
    fn extract_metrics(&self, raw: &Value) -> TransferMetrics;

    /// Summarise network connectivity from a raw stats payload.
    fn network_status(&self, raw: &Value) -> NetworkStatus;

    /// Read the client's own log (clients with the `logs` capability).
    async fn get_log(&self) -> anyhow::Result<String> {
        bail!("logs are not exposed by this client");
    }

    /// List the client's servers (ed2k only).
    async fn get_servers(&self) -> anyhow::Result<Vec<ServerInfo>> {
        bail!("server lists are not exposed by this client");
    }

    /// Run a server action (`connect`, `disconnect`, `remove`) against an
    /// address (ed2k only).
    async fn server_action(&self, action: &str, address: &str) -> anyhow::Result<()> {
        let _ = (action, address);
        bail!("server actions are not supported by this client");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdapter;

    #[async_trait]
    impl ClientAdapter for StubAdapter {
        fn kind(&self) -> ClientKind {
            ClientKind::QBittorrent
        }

        fn identity(&self) -> ClientIdentity {
            ClientIdentity {
                instance_id: "qbittorrent-localhost-8080".to_string(),
                kind: ClientKind::QBittorrent,
                display_name: "qB".to_string(),
            }
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn is_connected(&self) -> bool {
            false
        }

        async fn init_client(&self) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn shutdown(&self) {}

        async fn fetch_data(&self, _hint: &[CategorySpec]) -> anyhow::Result<FetchBatch> {
            Ok(FetchBatch::default())
        }

        async fn pause(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn resume(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn set_category(
            &self,
            _hash: &str,
            _category: &str,
            _priority: Option<UnifiedPriority>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_item(
            &self,
            _hash: &str,
            _request: &DeleteRequest,
        ) -> anyhow::Result<DeleteOutcome> {
            Ok(DeleteOutcome::default())
        }

        async fn get_files(&self, _hash: &str) -> anyhow::Result<Vec<ClientFile>> {
            Ok(Vec::new())
        }

        async fn ensure_category_exists(
            &self,
            _spec: &CategorySpec,
        ) -> anyhow::Result<EnsureCategoryOutcome> {
            Ok(EnsureCategoryOutcome::default())
        }

        async fn ensure_categories_batch(&self, _specs: &[CategorySpec]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn edit_category(&self, _spec: &CategorySpec) -> anyhow::Result<CategoryEditOutcome> {
            Ok(CategoryEditOutcome::default())
        }

        async fn rename_category(&self, _old: &str, _new: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_category(&self, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_stats(&self) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }

        fn extract_metrics(&self, _raw: &Value) -> TransferMetrics {
            TransferMetrics::default()
        }

        fn network_status(&self, _raw: &Value) -> NetworkStatus {
            NetworkStatus {
                status: NetworkHealth::Red,
                text: "disconnected".to_string(),
                port_open: false,
                listen_port: None,
            }
        }
    }

    #[tokio::test]
    async fn ed2k_only_defaults_report_lack_of_support() {
        let adapter = StubAdapter;
        assert!(adapter.add_ed2k_link("ed2k://|file|x|1|aa|/", None).await.is_err());
        assert!(adapter.add_search_result("aa", None).await.is_err());
        assert!(adapter.refresh_shared_files().await.is_err());
        assert!(adapter.ensure_amule_category_id("Movies").await.is_err());
        assert!(adapter.search(&SearchQuery::default()).await.is_err());
        assert!(adapter.get_log().await.is_err());
    }
}
