//! The rTorrent adapter, speaking XML-RPC over HTTP.
//!
//! Item state comes from one `d.multicall2` per poll. Tracker and peer
//! detail lists refresh on a background task that issues at most two
//! `system.multicall` round-trips per refresh, independent of item count;
//! the results are cached in-adapter and merged into subsequent polls.

pub(crate) mod xmlrpc;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use peerdeck_core::{
    AddOptions, CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity,
    ClientKind, DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch, ItemStatus,
    NetworkHealth, NetworkStatus, Peer, SourceCounts, TorrentExtras, TrackerInfo, TransferMetrics,
    UnifiedItem, UnifiedPriority,
};
use peerdeck_events::{Event, EventBus};

use crate::connection::ConnectionFlags;
use xmlrpc::{build_call, parse_response, XmlRpcValue};

/// How often the background task refreshes tracker and peer details.
const TRACKER_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Derive the native status label from the multicall state columns.
fn status_label(active: i64, complete: i64, hashing: i64, state: i64, message: &str) -> &'static str {
    if !message.is_empty() && message.contains("error") {
        return "error";
    }
    if hashing > 0 {
        return "hashing";
    }
    if state == 0 {
        return "stopped";
    }
    if active == 0 {
        return "paused";
    }
    if complete > 0 {
        return "seeding";
    }
    "downloading"
}

struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RpcClient {
    async fn call(&self, method: &str, params: &[XmlRpcValue]) -> anyhow::Result<XmlRpcValue> {
        let body = build_call(method, params);
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await
            .with_context(|| format!("rtorrent call {method} failed"))?
            .error_for_status()
            .with_context(|| format!("rtorrent call {method} rejected"))?
            .text()
            .await
            .with_context(|| format!("rtorrent call {method} body unreadable"))?;
        parse_response(&response).with_context(|| format!("rtorrent call {method} returned junk"))
    }
}

/// Adapter for one rTorrent instance.
pub struct RtorrentAdapter {
    identity: ClientIdentity,
    flags: ConnectionFlags,
    rpc: RpcClient,
    events: EventBus,
    last_batch: Mutex<FetchBatch>,
    tracker_cache: Mutex<HashMap<String, Vec<TrackerInfo>>>,
    peer_cache: Mutex<HashMap<String, Vec<Peer>>>,
}

impl RtorrentAdapter {
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
        events: EventBus,
    ) -> anyhow::Result<Arc<Self>> {
        let scheme = if use_ssl { "https" } else { "http" };
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("failed to build http client")?;
        Ok(Arc::new(Self {
            identity: ClientIdentity {
                instance_id: instance_id.to_string(),
                kind: ClientKind::RTorrent,
                display_name: display_name.to_string(),
            },
            flags: ConnectionFlags::new(enabled),
            rpc: RpcClient {
                http,
                endpoint: format!("{scheme}://{host}:{port}/RPC2"),
            },
            events,
            last_batch: Mutex::new(FetchBatch::default()),
            tracker_cache: Mutex::new(HashMap::new()),
            peer_cache: Mutex::new(HashMap::new()),
        }))
    }

    /// Spawn the background tracker/peer refresh loop for this adapter.
    pub fn spawn_tracker_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                sleep(TRACKER_REFRESH_INTERVAL).await;
                if !adapter.flags.is_connected() {
                    continue;
                }
                if let Err(err) = adapter.refresh_detail_caches().await {
                    warn!(
                        instance = %adapter.identity.instance_id,
                        error = %err,
                        "tracker refresh failed"
                    );
                }
            }
        })
    }

    /// Two batched round-trips: tracker lists, then peer lists, for every
    /// item in the last poll.
    async fn refresh_detail_caches(&self) -> anyhow::Result<()> {
        let hashes: Vec<String> = {
            let batch = self.last_batch.lock().await;
            batch.downloads.iter().map(|item| item.hash.clone()).collect()
        };
        if hashes.is_empty() {
            return Ok(());
        }

        let tracker_calls: Vec<XmlRpcValue> = hashes
            .iter()
            .map(|hash| multicall_entry(
                "t.multicall",
                vec![
                    XmlRpcValue::Str(hash.to_uppercase()),
                    XmlRpcValue::Str(String::new()),
                    XmlRpcValue::Str("t.url=".to_string()),
                    XmlRpcValue::Str("t.is_usable=".to_string()),
                    XmlRpcValue::Str("t.scrape_complete=".to_string()),
                ],
            ))
            .collect();
        let tracker_rows = self
            .rpc
            .call("system.multicall", &[XmlRpcValue::Array(tracker_calls)])
            .await?;

        let mut trackers = HashMap::new();
        if let Some(per_hash) = tracker_rows.as_array() {
            for (hash, row) in hashes.iter().zip(per_hash) {
                // system.multicall wraps each result in a one-element array.
                let list = row
                    .as_array()
                    .and_then(|outer| outer.first())
                    .and_then(XmlRpcValue::as_array)
                    .unwrap_or(&[]);
                let parsed: Vec<TrackerInfo> = list
                    .iter()
                    .filter_map(|entry| {
                        let columns = entry.as_array()?;
                        Some(TrackerInfo {
                            url: columns.first()?.as_str()?.to_string(),
                            status: if columns.get(1)?.as_i64()? > 0 {
                                "working".to_string()
                            } else {
                                "unusable".to_string()
                            },
                            peers: columns
                                .get(2)
                                .and_then(XmlRpcValue::as_i64)
                                .and_then(|peers| u32::try_from(peers).ok()),
                        })
                    })
                    .collect();
                trackers.insert(hash.clone(), parsed);
            }
        }
        *self.tracker_cache.lock().await = trackers;

        let peer_calls: Vec<XmlRpcValue> = hashes
            .iter()
            .map(|hash| multicall_entry(
                "p.multicall",
                vec![
                    XmlRpcValue::Str(hash.to_uppercase()),
                    XmlRpcValue::Str(String::new()),
                    XmlRpcValue::Str("p.address=".to_string()),
                    XmlRpcValue::Str("p.port=".to_string()),
                    XmlRpcValue::Str("p.client_version=".to_string()),
                    XmlRpcValue::Str("p.up_rate=".to_string()),
                    XmlRpcValue::Str("p.down_rate=".to_string()),
                    XmlRpcValue::Str("p.completed_percent=".to_string()),
                ],
            ))
            .collect();
        let peer_rows = self
            .rpc
            .call("system.multicall", &[XmlRpcValue::Array(peer_calls)])
            .await?;

        let mut peers = HashMap::new();
        if let Some(per_hash) = peer_rows.as_array() {
            for (hash, row) in hashes.iter().zip(per_hash) {
                let list = row
                    .as_array()
                    .and_then(|outer| outer.first())
                    .and_then(XmlRpcValue::as_array)
                    .unwrap_or(&[]);
                let parsed: Vec<Peer> = list
                    .iter()
                    .filter_map(|entry| {
                        let columns = entry.as_array()?;
                        Some(Peer {
                            address: columns.first()?.as_str()?.to_string(),
                            port: columns
                                .get(1)
                                .and_then(XmlRpcValue::as_i64)
                                .and_then(|port| u16::try_from(port).ok())
                                .unwrap_or(0),
                            software: columns
                                .get(2)
                                .and_then(XmlRpcValue::as_str)
                                .map(str::to_string),
                            upload_rate: columns
                                .get(3)
                                .and_then(XmlRpcValue::as_i64)
                                .map_or(0, |rate| rate.max(0) as u64),
                            download_rate: columns
                                .get(4)
                                .and_then(XmlRpcValue::as_i64)
                                .map_or(0, |rate| rate.max(0) as u64),
                            progress: columns
                                .get(5)
                                .and_then(XmlRpcValue::as_i64)
                                .map(|percent| f64::from(percent as i32) / 100.0),
                            ..Peer::default()
                        })
                    })
                    .collect();
                peers.insert(hash.clone(), parsed);
            }
        }
        *self.peer_cache.lock().await = peers;
        Ok(())
    }

    async fn item_directory(&self, hash: &str) -> Option<String> {
        let batch = self.last_batch.lock().await;
        batch
            .downloads
            .iter()
            .find(|item| item.hash.eq_ignore_ascii_case(hash))
            .and_then(|item| item.torrent.as_ref())
            .and_then(|extras| extras.save_path.clone())
    }

    async fn on_transport_failure(&self, context: &str, err: &anyhow::Error) {
        warn!(
            instance = %self.identity.instance_id,
            operation = context,
            error = %err,
            "rtorrent transport failure; marking disconnected"
        );
        self.flags.mark_disconnected();
        self.events.publish(Event::ClientDisconnected {
            instance_id: self.identity.instance_id.clone(),
            reason: Some(err.to_string()),
        });
    }

    async fn labels_in_use(&self) -> Vec<String> {
        let batch = self.last_batch.lock().await;
        let mut labels: Vec<String> = batch
            .downloads
            .iter()
            .filter_map(|item| item.torrent.as_ref())
            .filter_map(|extras| extras.label.clone())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}

fn multicall_entry(method: &str, params: Vec<XmlRpcValue>) -> XmlRpcValue {
    XmlRpcValue::Struct(vec![
        (
            "methodName".to_string(),
            XmlRpcValue::Str(method.to_string()),
        ),
        ("params".to_string(), XmlRpcValue::Array(params)),
    ])
}

#[async_trait]
impl ClientAdapter for RtorrentAdapter {
    fn kind(&self) -> ClientKind {
        ClientKind::RTorrent
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

        let outcome = self.rpc.call("system.client_version", &[]).await;
        match outcome {
            Ok(version) if version.as_str().is_some_and(|v| !v.is_empty()) => {
                debug!(
                    instance = %self.identity.instance_id,
                    version = version.as_str().unwrap_or(""),
                    "rtorrent connected"
                );
                self.flags.finish_connect(true);
                self.events.publish(Event::ClientConnected {
                    instance_id: self.identity.instance_id.clone(),
                });
                Ok(true)
            }
            Ok(_) => {
                self.flags.finish_connect(false);
                Err(anyhow!("rtorrent returned an empty version"))
            }
            Err(err) => {
                self.flags.finish_connect(false);
                Err(err)
            }
        }
    }

    async fn shutdown(&self) {
        self.flags.mark_disconnected();
    }

    async fn fetch_data(&self, _categories_hint: &[CategorySpec]) -> anyhow::Result<FetchBatch> {
        let columns = [
            "d.hash=",
            "d.name=",
            "d.size_bytes=",
            "d.completed_bytes=",
            "d.down.rate=",
            "d.up.rate=",
            "d.is_active=",
            "d.complete=",
            "d.hashing=",
            "d.state=",
            "d.custom1=",
            "d.directory=",
            "d.ratio=",
            "d.up.total=",
            "d.peers_accounted=",
            "d.peers_complete=",
            "d.message=",
        ];
        let mut params = vec![
            XmlRpcValue::Str(String::new()),
            XmlRpcValue::Str("main".to_string()),
        ];
        params.extend(columns.iter().map(|c| XmlRpcValue::Str((*c).to_string())));

        let rows = match self.rpc.call("d.multicall2", &params).await {
            Ok(rows) => rows,
            Err(err) => {
                self.on_transport_failure("fetch_data", &err).await;
                return Ok(self.last_batch.lock().await.clone());
            }
        };

        let trackers = self.tracker_cache.lock().await.clone();
        let peers = self.peer_cache.lock().await.clone();
        let meta = ClientKind::RTorrent.meta();

        let mut downloads = Vec::new();
        for row in rows.as_array().unwrap_or(&[]) {
            let Some(columns) = row.as_array() else {
                continue;
            };
            let get_str = |index: usize| -> String {
                columns
                    .get(index)
                    .and_then(XmlRpcValue::as_str)
                    .unwrap_or("")
                    .to_string()
            };
            let get_i64 = |index: usize| -> i64 {
                columns.get(index).and_then(XmlRpcValue::as_i64).unwrap_or(0)
            };

            let hash = get_str(0);
            if hash.is_empty() {
                continue;
            }
            let mut item = UnifiedItem::new(
                self.identity.instance_id.clone(),
                ClientKind::RTorrent,
                &hash,
                &get_str(1),
            );
            item.size = get_i64(2).max(0) as u64;
            item.size_downloaded = get_i64(3).max(0) as u64;
            item.progress = if item.size == 0 {
                0.0
            } else {
                item.size_downloaded as f64 / item.size as f64
            };
            item.download_speed = get_i64(4).max(0) as u64;
            item.upload_speed = get_i64(5).max(0) as u64;
            let label = get_str(10);
            let message = get_str(16);
            item.status = meta.unified_status(status_label(
                get_i64(6),
                get_i64(7),
                get_i64(8),
                get_i64(9),
                &message,
            ));
            item.category = label.clone();
            item.downloading = item.progress < 1.0;
            item.seeding = item.status == ItemStatus::Seeding;
            item.complete = item.progress >= 1.0;
            item.shared = item.seeding;
            item.sources = SourceCounts {
                total: get_i64(14).max(0) as u32,
                connected: get_i64(14).max(0) as u32,
                seeders: get_i64(15).max(0) as u32,
                a4af: None,
                not_current: None,
            };
            item.ratio = get_i64(12) as f64 / 1_000.0;
            item.upload_total = get_i64(13).max(0) as u64;
            if item.download_speed > 0 && item.size > item.size_downloaded {
                item.eta = Some((item.size - item.size_downloaded) / item.download_speed);
            }
            item.torrent = Some(TorrentExtras {
                save_path: {
                    let directory = get_str(11);
                    (!directory.is_empty()).then_some(directory)
                },
                label: (!label.is_empty()).then_some(label),
                trackers: trackers.get(&item.hash).cloned().unwrap_or_default(),
                private: None,
            });
            item.peers_detailed = peers.get(&item.hash).cloned().unwrap_or_default();
            item.raw = json!({ "message": message });
            item.reconcile();
            downloads.push(item);
        }

        let batch = FetchBatch {
            shared_files: downloads.clone(),
            downloads,
            uploads: Vec::new(),
        };
        *self.last_batch.lock().await = batch.clone();
        Ok(batch)
    }

    async fn pause(&self, hash: &str) -> anyhow::Result<()> {
        self.rpc
            .call("d.stop", &[XmlRpcValue::Str(hash.to_uppercase())])
            .await
            .map(|_| ())
    }

    async fn resume(&self, hash: &str) -> anyhow::Result<()> {
        self.rpc
            .call("d.start", &[XmlRpcValue::Str(hash.to_uppercase())])
            .await
            .map(|_| ())
    }

    async fn stop(&self, hash: &str) -> anyhow::Result<()> {
        self.rpc
            .call("d.close", &[XmlRpcValue::Str(hash.to_uppercase())])
            .await
            .map(|_| ())
    }

    async fn add_magnet(&self, uri: &str, opts: &AddOptions) -> anyhow::Result<String> {
        self.rpc
            .call(
                "load.start",
                &[
                    XmlRpcValue::Str(String::new()),
                    XmlRpcValue::Str(uri.to_string()),
                ],
            )
            .await?;
        let hash = crate::qbittorrent::magnet_hash(uri).unwrap_or_default();
        if !hash.is_empty() {
            if let Some(category) = &opts.category {
                self.set_category(&hash, category, None).await?;
            }
            if let Some(save_path) = &opts.save_path {
                let _ = self.update_directory(&hash, save_path).await;
            }
        }
        Ok(hash)
    }

    async fn set_category(
        &self,
        hash: &str,
        category: &str,
        _priority: Option<UnifiedPriority>,
    ) -> anyhow::Result<()> {
        self.rpc
            .call(
                "d.custom1.set",
                &[
                    XmlRpcValue::Str(hash.to_uppercase()),
                    XmlRpcValue::Str(category.to_string()),
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
        let directory = if request.delete_files {
            match &request.file_path {
                Some(path) => Some(path.clone()),
                None => self.item_directory(hash).await,
            }
        } else {
            None
        };
        self.rpc
            .call("d.erase", &[XmlRpcValue::Str(hash.to_uppercase())])
            .await?;
        // d.erase never touches payload data; the core removes it.
        Ok(DeleteOutcome {
            success: true,
            paths_to_delete: directory.into_iter().collect(),
        })
    }

    async fn update_directory(&self, hash: &str, path: &str) -> anyhow::Result<()> {
        self.rpc
            .call(
                "d.directory.set",
                &[
                    XmlRpcValue::Str(hash.to_uppercase()),
                    XmlRpcValue::Str(path.to_string()),
                ],
            )
            .await
            .map(|_| ())
    }

    async fn get_files(&self, hash: &str) -> anyhow::Result<Vec<ClientFile>> {
        let rows = self
            .rpc
            .call(
                "f.multicall",
                &[
                    XmlRpcValue::Str(hash.to_uppercase()),
                    XmlRpcValue::Str(String::new()),
                    XmlRpcValue::Str("f.path=".to_string()),
                    XmlRpcValue::Str("f.size_bytes=".to_string()),
                    XmlRpcValue::Str("f.completed_chunks=".to_string()),
                    XmlRpcValue::Str("f.size_chunks=".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .as_array()
            .unwrap_or(&[])
            .iter()
            .filter_map(|row| {
                let columns = row.as_array()?;
                let chunks_done = columns.get(2).and_then(XmlRpcValue::as_i64).unwrap_or(0);
                let chunks_total = columns.get(3).and_then(XmlRpcValue::as_i64).unwrap_or(0);
                Some(ClientFile {
                    path: columns.first()?.as_str()?.to_string(),
                    size: columns.get(1).and_then(XmlRpcValue::as_i64).unwrap_or(0).max(0)
                        as u64,
                    progress: if chunks_total == 0 {
                        0.0
                    } else {
                        chunks_done as f64 / chunks_total as f64
                    },
                })
            })
            .collect())
    }

    async fn native_categories(&self) -> anyhow::Result<Vec<CategorySpec>> {
        Ok(self
            .labels_in_use()
            .await
            .into_iter()
            .map(|label| CategorySpec {
                name: label,
                path: None,
                comment: String::new(),
                color: String::new(),
                priority: None,
            })
            .collect())
    }

    async fn default_directory(&self) -> anyhow::Result<Option<String>> {
        let value = self.rpc.call("directory.default", &[]).await?;
        Ok(value.as_str().filter(|path| !path.is_empty()).map(str::to_string))
    }

    async fn ensure_category_exists(
        &self,
        _spec: &CategorySpec,
    ) -> anyhow::Result<EnsureCategoryOutcome> {
        // Labels are free-form custom values; they exist once assigned.
        Ok(EnsureCategoryOutcome::default())
    }

    async fn ensure_categories_batch(&self, _specs: &[CategorySpec]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn edit_category(&self, _spec: &CategorySpec) -> anyhow::Result<CategoryEditOutcome> {
        Ok(CategoryEditOutcome {
            verified: true,
            mismatches: Vec::new(),
        })
    }

    async fn rename_category(&self, old_name: &str, new_name: &str) -> anyhow::Result<()> {
        let hashes: Vec<String> = {
            let batch = self.last_batch.lock().await;
            batch
                .downloads
                .iter()
                .filter(|item| item.category == old_name)
                .map(|item| item.hash.clone())
                .collect()
        };
        for hash in hashes {
            self.set_category(&hash, new_name, None).await?;
        }
        Ok(())
    }

    async fn delete_category(&self, name: &str) -> anyhow::Result<()> {
        let hashes: Vec<String> = {
            let batch = self.last_batch.lock().await;
            batch
                .downloads
                .iter()
                .filter(|item| item.category == name)
                .map(|item| item.hash.clone())
                .collect()
        };
        for hash in hashes {
            self.set_category(&hash, "", None).await?;
        }
        Ok(())
    }

    async fn get_stats(&self) -> anyhow::Result<Value> {
        let calls = XmlRpcValue::Array(vec![
            multicall_entry("throttle.global_down.rate", Vec::new()),
            multicall_entry("throttle.global_up.rate", Vec::new()),
            multicall_entry("throttle.global_down.total", Vec::new()),
            multicall_entry("throttle.global_up.total", Vec::new()),
            multicall_entry("network.listen.port", Vec::new()),
        ]);
        let results = self.rpc.call("system.multicall", &[calls]).await?;
        let scalar = |index: usize| -> i64 {
            results
                .as_array()
                .and_then(|rows| rows.get(index))
                .and_then(XmlRpcValue::as_array)
                .and_then(|row| row.first())
                .and_then(XmlRpcValue::as_i64)
                .unwrap_or(0)
        };
        Ok(json!({
            "downloadSpeed": scalar(0).max(0),
            "uploadSpeed": scalar(1).max(0),
            "downloadTotal": scalar(2).max(0),
            "uploadTotal": scalar(3).max(0),
            "listenPort": scalar(4).max(0),
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
        let listen_port = raw["listenPort"]
            .as_u64()
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port > 0);
        let (status, text) = if self.flags.is_connected() {
            (NetworkHealth::Green, "Connected".to_string())
        } else {
            (NetworkHealth::Red, "Not connected".to_string())
        };
        NetworkStatus {
            status,
            text,
            port_open: listen_port.is_some(),
            listen_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_derivation_covers_the_state_grid() {
        assert_eq!(status_label(1, 0, 0, 1, ""), "downloading");
        assert_eq!(status_label(1, 1, 0, 1, ""), "seeding");
        assert_eq!(status_label(0, 0, 0, 1, ""), "paused");
        assert_eq!(status_label(0, 1, 0, 0, ""), "stopped");
        assert_eq!(status_label(1, 0, 1, 1, ""), "hashing");
        assert_eq!(status_label(1, 0, 0, 1, "Tracker error"), "error");
    }

    #[test]
    fn multicall_entries_render_structs() {
        let entry = multicall_entry(
            "t.multicall",
            vec![XmlRpcValue::Str("HASH".to_string())],
        );
        let rendered = build_call("system.multicall", &[XmlRpcValue::Array(vec![entry])]);
        assert!(rendered.contains("<name>methodName</name>"));
        assert!(rendered.contains("<string>t.multicall</string>"));
        assert!(rendered.contains("<string>HASH</string>"));
    }
}
