//! The aMule (ed2k) adapter.
//!
//! Speaks EC through an injected [`EcTransport`]; this module owns
//! normalization into the unified model, category id bookkeeping, and the
//! connection lifecycle.

pub mod stub;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use peerdeck_categories::{amule_color_to_hex, hex_color_to_amule};
use peerdeck_core::{
    CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity, ClientKind,
    DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch, ItemStatus, NetworkHealth,
    NetworkStatus, Peer, SearchQuery, SearchResult, ServerInfo, SourceCounts, TransferMetrics,
    UnifiedItem, UnifiedPriority, UploadSlot,
};
use peerdeck_events::{Event, EventBus};

use crate::connection::ConnectionFlags;

pub use transport::{
    EcCategory, EcDownload, EcPreferences, EcSearchHit, EcSharedFile, EcTransport, EcUpload,
};

/// Translate the native part-file status code into its label.
const fn status_label(code: u8) -> &'static str {
    match code {
        0 => "downloading",
        1 | 2 => "waiting",
        3 => "hashing",
        4 => "erroneous",
        5 => "insufficient",
        7 => "paused",
        8 => "completing",
        9 => "complete",
        10 => "allocating",
        _ => "unknown",
    }
}

/// Adapter for one aMule instance.
pub struct AmuleAdapter {
    identity: ClientIdentity,
    flags: ConnectionFlags,
    transport: Arc<dyn EcTransport>,
    password: String,
    events: EventBus,
    category_names: Mutex<HashMap<u32, String>>,
    category_ids: Mutex<HashMap<String, u32>>,
    last_batch: Mutex<FetchBatch>,
}

impl AmuleAdapter {
    /// Build the adapter for one configured instance.
    #[must_use]
    pub fn new(
        instance_id: &str,
        display_name: &str,
        enabled: bool,
        password: &str,
        transport: Arc<dyn EcTransport>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity: ClientIdentity {
                instance_id: instance_id.to_string(),
                kind: ClientKind::Amule,
                display_name: display_name.to_string(),
            },
            flags: ConnectionFlags::new(enabled),
            transport,
            password: password.to_string(),
            events,
            category_names: Mutex::new(HashMap::new()),
            category_ids: Mutex::new(HashMap::new()),
            last_batch: Mutex::new(FetchBatch::default()),
        })
    }

    async fn refresh_category_cache(&self) -> anyhow::Result<Vec<EcCategory>> {
        let categories = self.transport.categories().await?;
        let mut names = self.category_names.lock().await;
        let mut ids = self.category_ids.lock().await;
        names.clear();
        ids.clear();
        for category in &categories {
            names.insert(category.id, category.title.clone());
            ids.insert(category.title.clone(), category.id);
        }
        Ok(categories)
    }

    async fn category_name(&self, id: u32) -> String {
        if id == 0 {
            return String::new();
        }
        self.category_names
            .lock()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn normalize_download(&self, raw: &EcDownload, category: String) -> UnifiedItem {
        let mut item = UnifiedItem::new(
            self.identity.instance_id.clone(),
            ClientKind::Amule,
            &raw.hash,
            &raw.name,
        );
        let meta = ClientKind::Amule.meta();
        item.size = raw.size_full;
        item.size_downloaded = raw.size_done;
        item.progress = if raw.size_full == 0 {
            0.0
        } else {
            raw.size_done as f64 / raw.size_full as f64
        };
        item.download_speed = raw.speed;
        item.status = meta.unified_status(status_label(raw.status_code));
        item.category = category;
        item.downloading = true;
        item.seeding = meta.is_seeding_status(item.status);
        item.sources = SourceCounts {
            total: raw.source_count,
            connected: raw.source_count_xfer,
            seeders: 0,
            a4af: Some(raw.source_count_a4af),
            not_current: Some(raw.source_count_not_current),
        };
        item.eta = if raw.speed > 0 && raw.size_full > raw.size_done {
            Some((raw.size_full - raw.size_done) / raw.speed.max(1))
        } else {
            None
        };
        item.ed2k = Some(peerdeck_core::Ed2kExtras {
            ed2k_link: raw.ed2k_link.clone(),
            category_id: (raw.category_id != 0).then_some(raw.category_id),
            part_status: raw.part_status.clone(),
        });
        item.raw = serde_json::to_value(raw).unwrap_or(Value::Null);
        item.reconcile();
        item
    }

    fn normalize_shared(&self, raw: &EcSharedFile) -> UnifiedItem {
        let mut item = UnifiedItem::new(
            self.identity.instance_id.clone(),
            ClientKind::Amule,
            &raw.hash,
            &raw.name,
        );
        item.size = raw.size;
        item.size_downloaded = raw.size;
        item.progress = 1.0;
        item.status = ItemStatus::Seeding;
        item.shared = true;
        item.complete = true;
        item.seeding = true;
        item.upload_total = raw.upload_total;
        item.ed2k = Some(peerdeck_core::Ed2kExtras {
            ed2k_link: raw.ed2k_link.clone(),
            category_id: None,
            part_status: None,
        });
        item.raw = serde_json::to_value(raw).unwrap_or(Value::Null);
        item.reconcile();
        item
    }

    fn normalize_upload(raw: &EcUpload) -> UploadSlot {
        UploadSlot {
            hash: raw.file_hash.as_ref().map(|hash| hash.to_ascii_lowercase()),
            peer: Peer {
                address: raw.peer_address.clone(),
                port: raw.peer_port,
                software: raw.client_software.clone(),
                upload_rate: raw.speed,
                ..Peer::default()
            },
        }
    }

    async fn on_transport_failure(&self, context: &str, err: &anyhow::Error) {
        warn!(
            instance = %self.identity.instance_id,
            operation = context,
            error = %err,
            "ec transport failure; marking disconnected"
        );
        self.flags.mark_disconnected();
        self.events.publish(Event::ClientDisconnected {
            instance_id: self.identity.instance_id.clone(),
            reason: Some(err.to_string()),
        });
    }

    async fn category_id_for(&self, name: &str) -> anyhow::Result<u32> {
        if let Some(id) = self.category_ids.lock().await.get(name) {
            return Ok(*id);
        }
        let categories = self.refresh_category_cache().await?;
        if let Some(category) = categories.iter().find(|category| category.title == name) {
            return Ok(category.id);
        }
        // Still unknown: create the category natively with defaults.
        let id = self
            .transport
            .create_category(&EcCategory {
                id: 0,
                title: name.to_string(),
                path: String::new(),
                comment: String::new(),
                color: 0,
                priority: 0,
            })
            .await
            .context("failed to create native category")?;
        self.category_names.lock().await.insert(id, name.to_string());
        self.category_ids.lock().await.insert(name.to_string(), id);
        Ok(id)
    }

    fn spec_to_native(spec: &CategorySpec, id: u32) -> EcCategory {
        EcCategory {
            id,
            title: spec.name.clone(),
            path: spec.path.clone().unwrap_or_default(),
            comment: spec.comment.clone(),
            color: hex_color_to_amule(&spec.color).unwrap_or(0),
            priority: spec.priority.unwrap_or(UnifiedPriority::Normal).code(),
        }
    }
}

#[async_trait]
impl ClientAdapter for AmuleAdapter {
    fn kind(&self) -> ClientKind {
        ClientKind::Amule
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
            self.transport
                .connect(&self.password)
                .await
                .context("ec connect failed")?;
            let version = self.transport.version().await.context("version check failed")?;
            if version.is_empty() {
                return Err(anyhow!("daemon returned an empty version"));
            }
            debug!(instance = %self.identity.instance_id, version = %version, "ec connected");
            let _ = self.refresh_category_cache().await;
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
        self.transport.close().await;
        self.flags.mark_disconnected();
    }

    async fn fetch_data(&self, _categories_hint: &[CategorySpec]) -> anyhow::Result<FetchBatch> {
        let fetched = async {
            let downloads = self.transport.download_queue().await?;
            let shared = self.transport.shared_files().await?;
            let uploads = self.transport.upload_queue().await?;
            Ok::<_, anyhow::Error>((downloads, shared, uploads))
        }
        .await;

        let (downloads, shared, uploads) = match fetched {
            Ok(data) => data,
            Err(err) => {
                self.on_transport_failure("fetch_data", &err).await;
                return Ok(self.last_batch.lock().await.clone());
            }
        };

        let mut batch = FetchBatch::default();
        for raw in &downloads {
            let category = self.category_name(raw.category_id).await;
            batch.downloads.push(self.normalize_download(raw, category));
        }
        batch.shared_files = shared
            .iter()
            .map(|raw| self.normalize_shared(raw))
            .collect();
        batch.uploads = uploads.iter().map(Self::normalize_upload).collect();

        *self.last_batch.lock().await = batch.clone();
        Ok(batch)
    }

    async fn pause(&self, hash: &str) -> anyhow::Result<()> {
        self.transport.pause_file(hash).await
    }

    async fn resume(&self, hash: &str) -> anyhow::Result<()> {
        self.transport.resume_file(hash).await
    }

    async fn stop(&self, hash: &str) -> anyhow::Result<()> {
        self.transport.stop_file(hash).await
    }

    async fn add_search_result(&self, hash: &str, category_id: Option<u32>) -> anyhow::Result<()> {
        self.transport.download_search_result(hash, category_id).await
    }

    async fn add_ed2k_link(&self, link: &str, category_id: Option<u32>) -> anyhow::Result<String> {
        self.transport.add_link(link, category_id).await
    }

    async fn set_category(
        &self,
        hash: &str,
        category: &str,
        _priority: Option<UnifiedPriority>,
    ) -> anyhow::Result<()> {
        let id = self.category_id_for(category).await?;
        self.transport.set_file_category(hash, id).await
    }

    async fn delete_item(
        &self,
        hash: &str,
        request: &DeleteRequest,
    ) -> anyhow::Result<DeleteOutcome> {
        if request.is_shared {
            // The EC API cannot unshare a file; the caller deletes it from
            // disk and triggers a shared-files rescan.
            let path = match &request.file_path {
                Some(path) => Some(path.clone()),
                None => {
                    let batch = self.last_batch.lock().await;
                    batch
                        .shared_files
                        .iter()
                        .find(|item| item.hash.eq_ignore_ascii_case(hash))
                        .and_then(|item| item.raw.get("path"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }
            };
            return Ok(DeleteOutcome {
                success: true,
                paths_to_delete: path.into_iter().collect(),
            });
        }

        self.transport.cancel_file(hash).await?;
        Ok(DeleteOutcome {
            success: true,
            paths_to_delete: Vec::new(),
        })
    }

    async fn get_files(&self, hash: &str) -> anyhow::Result<Vec<ClientFile>> {
        let batch = self.last_batch.lock().await;
        let item = batch
            .downloads
            .iter()
            .chain(batch.shared_files.iter())
            .find(|item| item.hash.eq_ignore_ascii_case(hash))
            .ok_or_else(|| anyhow!("unknown file {hash}"))?;
        Ok(vec![ClientFile {
            path: item.name.clone(),
            size: item.size,
            progress: item.progress,
        }])
    }

    async fn refresh_shared_files(&self) -> anyhow::Result<()> {
        self.transport.refresh_shared().await
    }

    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<SearchResult>> {
        let hits = self
            .transport
            .search(
                &query.text,
                query.file_type.as_deref(),
                query.min_size,
                query.max_size,
            )
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                hash: hit.hash.to_ascii_lowercase(),
                name: hit.name,
                size: hit.size,
                sources: hit.sources,
                complete_sources: hit.complete_sources,
            })
            .collect())
    }

    async fn native_categories(&self) -> anyhow::Result<Vec<CategorySpec>> {
        let categories = self.refresh_category_cache().await?;
        Ok(categories
            .into_iter()
            .map(|category| CategorySpec {
                name: category.title,
                path: (!category.path.is_empty()).then_some(category.path),
                comment: category.comment,
                color: amule_color_to_hex(category.color),
                priority: UnifiedPriority::from_code(category.priority),
            })
            .collect())
    }

    async fn default_directory(&self) -> anyhow::Result<Option<String>> {
        Ok(self.transport.preferences().await?.incoming_dir)
    }

    async fn ensure_category_exists(
        &self,
        spec: &CategorySpec,
    ) -> anyhow::Result<EnsureCategoryOutcome> {
        let id = self.category_id_for(&spec.name).await?;
        self.transport
            .update_category(&Self::spec_to_native(spec, id))
            .await?;
        Ok(EnsureCategoryOutcome { amule_id: Some(id) })
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
        let id = self.category_id_for(&spec.name).await?;
        self.transport
            .update_category(&Self::spec_to_native(spec, id))
            .await?;

        // Readback verification.
        let categories = self.refresh_category_cache().await?;
        let Some(stored) = categories.iter().find(|category| category.id == id) else {
            return Ok(CategoryEditOutcome {
                verified: false,
                mismatches: vec!["category disappeared after edit".to_string()],
            });
        };
        let mut mismatches = Vec::new();
        if let Some(path) = &spec.path {
            if &stored.path != path {
                mismatches.push("path".to_string());
            }
        }
        if stored.comment != spec.comment {
            mismatches.push("comment".to_string());
        }
        if stored.color != hex_color_to_amule(&spec.color).unwrap_or(stored.color) {
            mismatches.push("color".to_string());
        }
        Ok(CategoryEditOutcome {
            verified: mismatches.is_empty(),
            mismatches,
        })
    }

    async fn rename_category(&self, old_name: &str, new_name: &str) -> anyhow::Result<()> {
        let id = self.category_id_for(old_name).await?;
        let current = self
            .transport
            .categories()
            .await?
            .into_iter()
            .find(|category| category.id == id)
            .ok_or_else(|| anyhow!("category '{old_name}' vanished"))?;
        self.transport
            .update_category(&EcCategory {
                title: new_name.to_string(),
                ..current
            })
            .await?;
        let _ = self.refresh_category_cache().await;
        Ok(())
    }

    async fn delete_category(&self, name: &str) -> anyhow::Result<()> {
        let id = match self.category_ids.lock().await.get(name) {
            Some(id) => *id,
            None => return Ok(()),
        };
        self.transport.delete_category(id).await?;
        let _ = self.refresh_category_cache().await;
        Ok(())
    }

    async fn ensure_amule_category_id(&self, name: &str) -> anyhow::Result<u32> {
        self.category_id_for(name).await
    }

    async fn get_stats(&self) -> anyhow::Result<Value> {
        self.transport.stats().await
    }

    fn extract_metrics(&self, raw: &Value) -> TransferMetrics {
        TransferMetrics {
            upload_speed: raw["uploadSpeed"].as_u64().unwrap_or(0),
            download_speed: raw["downloadSpeed"].as_u64().unwrap_or(0),
            upload_total: raw["uploadTotal"].as_u64().unwrap_or(0),
            download_total: raw["downloadTotal"].as_u64().unwrap_or(0),
            pid: raw["pid"].as_u64().and_then(|pid| u32::try_from(pid).ok()),
        }
    }

    fn network_status(&self, raw: &Value) -> NetworkStatus {
        let ed2k = raw["ed2kConnected"].as_bool().unwrap_or(false);
        let high_id = raw["highId"].as_bool().unwrap_or(false);
        let kad = raw["kadConnected"].as_bool().unwrap_or(false);
        let listen_port = raw["listenPort"]
            .as_u64()
            .and_then(|port| u16::try_from(port).ok());
        let (status, text) = if ed2k && high_id {
            (NetworkHealth::Green, "Connected with high ID".to_string())
        } else if ed2k || kad {
            (NetworkHealth::Yellow, "Connected with low ID".to_string())
        } else {
            (NetworkHealth::Red, "Not connected".to_string())
        };
        NetworkStatus {
            status,
            text,
            port_open: high_id,
            listen_port,
        }
    }

    async fn get_log(&self) -> anyhow::Result<String> {
        self.transport.log().await
    }

    async fn get_servers(&self) -> anyhow::Result<Vec<ServerInfo>> {
        self.transport.servers().await
    }

    async fn server_action(&self, action: &str, address: &str) -> anyhow::Result<()> {
        self.transport.server_action(action, address).await
    }
}

/// Build the raw stats object shape the adapter consumes; used by transport
/// implementations and tests.
#[must_use]
pub fn stats_object(
    upload_speed: u64,
    download_speed: u64,
    upload_total: u64,
    download_total: u64,
    ed2k_connected: bool,
    high_id: bool,
) -> Value {
    json!({
        "uploadSpeed": upload_speed,
        "downloadSpeed": download_speed,
        "uploadTotal": upload_total,
        "downloadTotal": download_total,
        "ed2kConnected": ed2k_connected,
        "highId": high_id,
        "kadConnected": ed2k_connected,
        "listenPort": 4662,
    })
}

#[cfg(test)]
mod tests;
