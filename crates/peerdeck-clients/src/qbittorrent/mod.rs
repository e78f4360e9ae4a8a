//! The qBittorrent adapter, speaking the WebUI HTTP API.
//!
//! Modern WebUI versions replaced pause/resume with stop/start; the
//! `stop_replaces_pause` capability flag records that and both unified
//! operations land on the same endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use peerdeck_core::{
    AddOptions, CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity,
    ClientKind, DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch, NetworkHealth,
    NetworkStatus, SourceCounts, TorrentExtras, TransferMetrics, UnifiedItem, UnifiedPriority,
};
use peerdeck_events::{Event, EventBus};

use crate::connection::ConnectionFlags;

/// One entry of `torrents/info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct QbTorrentInfo {
    pub(crate) hash: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) size: i64,
    #[serde(default)]
    pub(crate) progress: f64,
    #[serde(default)]
    pub(crate) dlspeed: i64,
    #[serde(default)]
    pub(crate) upspeed: i64,
    #[serde(default)]
    pub(crate) eta: i64,
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) category: String,
    #[serde(default)]
    pub(crate) save_path: String,
    #[serde(default)]
    pub(crate) ratio: f64,
    #[serde(default)]
    pub(crate) num_seeds: i64,
    #[serde(default)]
    pub(crate) num_complete: i64,
    #[serde(default)]
    pub(crate) num_leechs: i64,
    #[serde(default)]
    pub(crate) num_incomplete: i64,
    #[serde(default)]
    pub(crate) uploaded: i64,
    #[serde(default)]
    pub(crate) downloaded: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct QbCategory {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "savePath")]
    save_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct QbTransferInfo {
    #[serde(default)]
    dl_info_speed: u64,
    #[serde(default)]
    up_info_speed: u64,
    #[serde(default)]
    dl_info_data: u64,
    #[serde(default)]
    up_info_data: u64,
    #[serde(default)]
    connection_status: String,
}

#[derive(Debug, Clone, Deserialize)]
struct QbFileEntry {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    progress: f64,
}

/// Adapter for one qBittorrent instance.
pub struct QbittorrentAdapter {
    identity: ClientIdentity,
    flags: ConnectionFlags,
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    events: EventBus,
    last_batch: Mutex<FetchBatch>,
}

impl QbittorrentAdapter {
    /// Build the adapter for one configured instance.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed.
    pub fn new(
        instance_id: &str,
        display_name: &str,
        enabled: bool,
        host: &str,
        port: u16,
        use_ssl: bool,
        username: &str,
        password: &str,
        events: EventBus,
    ) -> anyhow::Result<Arc<Self>> {
        let scheme = if use_ssl { "https" } else { "http" };
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("failed to build http client")?;
        Ok(Arc::new(Self {
            identity: ClientIdentity {
                instance_id: instance_id.to_string(),
                kind: ClientKind::QBittorrent,
                display_name: display_name.to_string(),
            },
            flags: ConnectionFlags::new(enabled),
            http,
            base_url: format!("{scheme}://{host}:{port}"),
            username: username.to_string(),
            password: password.to_string(),
            events,
            last_batch: Mutex::new(FetchBatch::default()),
        }))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v2/{endpoint}", self.base_url)
    }

    async fn post_form(&self, endpoint: &str, form: &[(&str, String)]) -> anyhow::Result<String> {
        let response = self
            .http
            .post(self.url(endpoint))
            .form(form)
            .send()
            .await
            .with_context(|| format!("qbittorrent request {endpoint} failed"))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("qbittorrent {endpoint} returned {status}: {body}");
        }
        Ok(body)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> anyhow::Result<T> {
        self.http
            .get(self.url(endpoint))
            .send()
            .await
            .with_context(|| format!("qbittorrent request {endpoint} failed"))?
            .error_for_status()
            .with_context(|| format!("qbittorrent {endpoint} rejected"))?
            .json::<T>()
            .await
            .with_context(|| format!("qbittorrent {endpoint} returned unexpected payload"))
    }

    async fn on_transport_failure(&self, context: &str, err: &anyhow::Error) {
        warn!(
            instance = %self.identity.instance_id,
            operation = context,
            error = %err,
            "qbittorrent transport failure; marking disconnected"
        );
        self.flags.mark_disconnected();
        self.events.publish(Event::ClientDisconnected {
            instance_id: self.identity.instance_id.clone(),
            reason: Some(err.to_string()),
        });
    }

    pub(crate) fn normalize(&self, info: &QbTorrentInfo) -> UnifiedItem {
        let mut item = UnifiedItem::new(
            self.identity.instance_id.clone(),
            ClientKind::QBittorrent,
            &info.hash,
            &info.name,
        );
        let meta = ClientKind::QBittorrent.meta();
        item.size = info.size.max(0) as u64;
        item.size_downloaded = if info.downloaded > 0 {
            info.downloaded as u64
        } else {
            (info.progress * info.size.max(0) as f64) as u64
        };
        item.progress = info.progress.clamp(0.0, 1.0);
        item.download_speed = info.dlspeed.max(0) as u64;
        item.upload_speed = info.upspeed.max(0) as u64;
        item.status = meta.unified_status(&info.state);
        item.category = info.category.clone();
        item.downloading = item.progress < 1.0;
        item.seeding = meta.is_seeding_status(item.status);
        item.complete = item.progress >= 1.0;
        item.shared = item.seeding;
        item.sources = SourceCounts {
            total: (info.num_complete + info.num_incomplete).max(0) as u32,
            connected: (info.num_seeds + info.num_leechs).max(0) as u32,
            seeders: info.num_complete.max(0) as u32,
            a4af: None,
            not_current: None,
        };
        item.upload_total = info.uploaded.max(0) as u64;
        item.ratio = info.ratio;
        item.eta = (info.eta > 0 && item.downloading).then_some(info.eta as u64);
        item.torrent = Some(TorrentExtras {
            save_path: (!info.save_path.is_empty()).then(|| info.save_path.clone()),
            label: (!info.category.is_empty()).then(|| info.category.clone()),
            trackers: Vec::new(),
            private: None,
        });
        item.raw = json!({
            "state": info.state,
            "savePath": info.save_path,
            "numSeeds": info.num_seeds,
            "numLeechs": info.num_leechs,
        });
        item.reconcile();
        item
    }
}

#[async_trait]
impl ClientAdapter for QbittorrentAdapter {
    fn kind(&self) -> ClientKind {
        ClientKind::QBittorrent
    }

    fn identity(&self) -> ClientIdentity {
        self.identity.clone()
    }

    fn is_enabled(&self) -> bool {
        self.flags.is_enabled()
    }

    fn is_connected(&self) -> bool {
        self.flags.is_connected()
    }

    async fn init_client(&self) -> anyhow::Result<bool> {
        if !self.flags.is_enabled() {
            return Ok(false);
        }
        if self.flags.is_connected() {
            return Ok(true);
        }
        if !self.flags.begin_connect() {
            debug!(instance = %self.identity.instance_id, "connect already in progress");
            return Ok(false);
        }

        let outcome = async {
            let body = self
                .post_form(
                    "auth/login",
                    &[
                        ("username", self.username.clone()),
                        ("password", self.password.clone()),
                    ],
                )
                .await?;
            if body.trim() == "Fails." {
                bail!("qbittorrent rejected the credentials");
            }
            let version = self
                .http
                .get(self.url("app/version"))
                .send()
                .await
                .context("version check failed")?
                .error_for_status()
                .context("version check rejected")?
                .text()
                .await
                .context("version body unreadable")?;
            if version.is_empty() {
                bail!("empty version response");
            }
            debug!(instance = %self.identity.instance_id, version = %version, "qbittorrent connected");
            Ok::<(), anyhow::Error>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                self.flags.finish_connect(true);
                self.events.publish(Event::ClientConnected {
                    instance_id: self.identity.instance_id.clone(),
                });
                Ok(true)
            }
            Err(err) => {
                self.flags.finish_connect(false);
                Err(err)
            }
        }
    }

    async fn shutdown(&self) {
        let _ = self.post_form("auth/logout", &[]).await;
        self.flags.mark_disconnected();
    }

    async fn fetch_data(&self, _categories_hint: &[CategorySpec]) -> anyhow::Result<FetchBatch> {
        let torrents: Vec<QbTorrentInfo> = match self.get_json("torrents/info").await {
            Ok(torrents) => torrents,
            Err(err) => {
                self.on_transport_failure("fetch_data", &err).await;
                return Ok(self.last_batch.lock().await.clone());
            }
        };

        let downloads: Vec<UnifiedItem> =
            torrents.iter().map(|info| self.normalize(info)).collect();
        let batch = FetchBatch {
            shared_files: downloads.clone(),
            downloads,
            uploads: Vec::new(),
        };
        *self.last_batch.lock().await = batch.clone();
        Ok(batch)
    }

    async fn pause(&self, hash: &str) -> anyhow::Result<()> {
        // WebUI ≥5 has no pause; stop stands in for it.
        self.post_form("torrents/stop", &[("hashes", hash.to_string())])
            .await
            .map(|_| ())
    }

    async fn resume(&self, hash: &str) -> anyhow::Result<()> {
        self.post_form("torrents/start", &[("hashes", hash.to_string())])
            .await
            .map(|_| ())
    }

    async fn stop(&self, hash: &str) -> anyhow::Result<()> {
        self.post_form("torrents/stop", &[("hashes", hash.to_string())])
            .await
            .map(|_| ())
    }

    async fn add_magnet(&self, uri: &str, opts: &AddOptions) -> anyhow::Result<String> {
        let mut form = vec![("urls", uri.to_string())];
        if let Some(category) = &opts.category {
            form.push(("category", category.clone()));
        }
        if let Some(save_path) = &opts.save_path {
            form.push(("savepath", save_path.clone()));
        }
        if opts.paused {
            form.push(("stopped", "true".to_string()));
        }
        self.post_form("torrents/add", &form).await?;
        Ok(magnet_hash(uri).unwrap_or_default())
    }

    async fn add_torrent_raw(&self, bytes: &[u8], opts: &AddOptions) -> anyhow::Result<String> {
        let mut form = reqwest::multipart::Form::new().part(
            "torrents",
            reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("upload.torrent"),
        );
        if let Some(category) = &opts.category {
            form = form.text("category", category.clone());
        }
        if let Some(save_path) = &opts.save_path {
            form = form.text("savepath", save_path.clone());
        }
        if opts.paused {
            form = form.text("stopped", "true");
        }
        self.http
            .post(self.url("torrents/add"))
            .multipart(form)
            .send()
            .await
            .context("torrent upload failed")?
            .error_for_status()
            .context("torrent upload rejected")?;
        Ok(String::new())
    }

    async fn set_category(
        &self,
        hash: &str,
        category: &str,
        _priority: Option<UnifiedPriority>,
    ) -> anyhow::Result<()> {
        self.post_form(
            "torrents/setCategory",
            &[
                ("hashes", hash.to_string()),
                ("category", category.to_string()),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn delete_item(
        &self,
        hash: &str,
        request: &DeleteRequest,
    ) -> anyhow::Result<DeleteOutcome> {
        self.post_form(
            "torrents/delete",
            &[
                ("hashes", hash.to_string()),
                ("deleteFiles", request.delete_files.to_string()),
            ],
        )
        .await?;
        // The API removes payload files itself; nothing left for the core.
        Ok(DeleteOutcome {
            success: true,
            paths_to_delete: Vec::new(),
        })
    }

    async fn update_directory(&self, hash: &str, path: &str) -> anyhow::Result<()> {
        self.post_form(
            "torrents/setLocation",
            &[("hashes", hash.to_string()), ("location", path.to_string())],
        )
        .await
        .map(|_| ())
    }

    async fn get_files(&self, hash: &str) -> anyhow::Result<Vec<ClientFile>> {
        let files: Vec<QbFileEntry> = self.get_json(&format!("torrents/files?hash={hash}")).await?;
        Ok(files
            .into_iter()
            .map(|file| ClientFile {
                path: file.name,
                size: file.size,
                progress: file.progress,
            })
            .collect())
    }

    async fn native_categories(&self) -> anyhow::Result<Vec<CategorySpec>> {
        let categories: HashMap<String, QbCategory> =
            self.get_json("torrents/categories").await?;
        Ok(categories
            .into_values()
            .map(|category| CategorySpec {
                name: category.name,
                path: (!category.save_path.is_empty()).then_some(category.save_path),
                comment: String::new(),
                color: String::new(),
                priority: None,
            })
            .collect())
    }

    async fn default_directory(&self) -> anyhow::Result<Option<String>> {
        let path = self
            .http
            .get(self.url("app/defaultSavePath"))
            .send()
            .await
            .context("default save path request failed")?
            .error_for_status()
            .context("default save path rejected")?
            .text()
            .await
            .context("default save path unreadable")?;
        Ok((!path.is_empty()).then_some(path))
    }

    async fn ensure_category_exists(
        &self,
        spec: &CategorySpec,
    ) -> anyhow::Result<EnsureCategoryOutcome> {
        let existing: HashMap<String, QbCategory> =
            self.get_json("torrents/categories").await.unwrap_or_default();
        if existing.contains_key(&spec.name) {
            return Ok(EnsureCategoryOutcome::default());
        }
        self.post_form(
            "torrents/createCategory",
            &[
                ("category", spec.name.clone()),
                ("savePath", spec.path.clone().unwrap_or_default()),
            ],
        )
        .await?;
        Ok(EnsureCategoryOutcome::default())
    }

    async fn ensure_categories_batch(&self, specs: &[CategorySpec]) -> anyhow::Result<()> {
        for spec in specs {
            if spec.name == "Default" {
                continue;
            }
            self.ensure_category_exists(spec).await?;
        }
        Ok(())
    }

    async fn edit_category(&self, spec: &CategorySpec) -> anyhow::Result<CategoryEditOutcome> {
        self.post_form(
            "torrents/editCategory",
            &[
                ("category", spec.name.clone()),
                ("savePath", spec.path.clone().unwrap_or_default()),
            ],
        )
        .await?;

        let categories: HashMap<String, QbCategory> =
            self.get_json("torrents/categories").await?;
        let verified = categories.get(&spec.name).is_some_and(|stored| {
            spec.path
                .as_deref()
                .is_none_or(|path| stored.save_path == path)
        });
        Ok(CategoryEditOutcome {
            verified,
            mismatches: if verified {
                Vec::new()
            } else {
                vec!["savePath".to_string()]
            },
        })
    }

    async fn rename_category(&self, old_name: &str, new_name: &str) -> anyhow::Result<()> {
        // The WebUI has no rename; recreate and retag.
        let categories: HashMap<String, QbCategory> =
            self.get_json("torrents/categories").await?;
        let save_path = categories
            .get(old_name)
            .map(|category| category.save_path.clone())
            .unwrap_or_default();
        self.post_form(
            "torrents/createCategory",
            &[
                ("category", new_name.to_string()),
                ("savePath", save_path),
            ],
        )
        .await?;
        let torrents: Vec<QbTorrentInfo> = self
            .get_json(&format!("torrents/info?category={old_name}"))
            .await
            .unwrap_or_default();
        for torrent in torrents {
            self.set_category(&torrent.hash, new_name, None).await?;
        }
        self.post_form(
            "torrents/removeCategories",
            &[("categories", old_name.to_string())],
        )
        .await
        .map(|_| ())
    }

    async fn delete_category(&self, name: &str) -> anyhow::Result<()> {
        self.post_form(
            "torrents/removeCategories",
            &[("categories", name.to_string())],
        )
        .await
        .map(|_| ())
    }

    async fn get_stats(&self) -> anyhow::Result<Value> {
        let info: QbTransferInfo = self.get_json("transfer/info").await?;
        Ok(json!({
            "uploadSpeed": info.up_info_speed,
            "downloadSpeed": info.dl_info_speed,
            "uploadTotal": info.up_info_data,
            "downloadTotal": info.dl_info_data,
            "connectionStatus": info.connection_status,
        }))
    }

    fn extract_metrics(&self, raw: &Value) -> TransferMetrics {
        TransferMetrics {
            upload_speed: raw["uploadSpeed"].as_u64().unwrap_or(0),
            download_speed: raw["downloadSpeed"].as_u64().unwrap_or(0),
            upload_total: raw["uploadTotal"].as_u64().unwrap_or(0),
            download_total: raw["downloadTotal"].as_u64().unwrap_or(0),
            pid: None,
        }
    }

    fn network_status(&self, raw: &Value) -> NetworkStatus {
        let connection = raw["connectionStatus"].as_str().unwrap_or("disconnected");
        let (status, text, port_open) = match connection {
            "connected" => (NetworkHealth::Green, "Connected", true),
            "firewalled" => (NetworkHealth::Yellow, "Firewalled", false),
            _ => (NetworkHealth::Red, "Disconnected", false),
        };
        NetworkStatus {
            status,
            text: text.to_string(),
            port_open,
            listen_port: None,
        }
    }

    async fn get_log(&self) -> anyhow::Result<String> {
        let entries: Vec<Value> = self.get_json("log/main").await?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry["message"].as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Extract the info-hash from a magnet URI, when present.
#[must_use]
pub(crate) fn magnet_hash(uri: &str) -> Option<String> {
    let marker = "urn:btih:";
    let start = uri.find(marker)? + marker.len();
    let rest = &uri[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    let hash = &rest[..end];
    (hash.len() == 40 && hash.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| hash.to_ascii_lowercase())
}
