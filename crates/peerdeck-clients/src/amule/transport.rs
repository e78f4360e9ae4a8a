//! The EC transport seam.
//!
//! The binary EC codec is an external collaborator; the adapter only speaks
//! this semantic operation set. A TCP implementation plugs in at runtime,
//! tests plug in an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use peerdeck_core::ServerInfo;

/// A download-queue entry as the daemon reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcDownload {
    /// 32-hex ed2k hash.
    pub hash: String,
    /// File name.
    pub name: String,
    /// Full payload size in bytes.
    pub size_full: u64,
    /// Bytes completed.
    pub size_done: u64,
    /// Current download speed in bytes per second.
    pub speed: u64,
    /// Native numeric part-file status code.
    pub status_code: u8,
    /// Native priority code.
    pub priority: u8,
    /// Native category id (0 = uncategorised).
    pub category_id: u32,
    /// Known sources.
    pub source_count: u32,
    /// Connected transferring sources.
    pub source_count_xfer: u32,
    /// Sources without needed parts.
    pub source_count_not_current: u32,
    /// Sources queued for another file.
    pub source_count_a4af: u32,
    /// Canonical ed2k link.
    pub ed2k_link: Option<String>,
    /// Part availability string.
    pub part_status: Option<String>,
}

/// A shared-file entry as the daemon reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcSharedFile {
    /// 32-hex ed2k hash.
    pub hash: String,
    /// File name.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// On-disk path on the daemon host.
    pub path: Option<String>,
    /// Bytes uploaded all-time.
    pub upload_total: u64,
    /// Accepted upload requests.
    pub accepted_requests: u64,
    /// Canonical ed2k link.
    pub ed2k_link: Option<String>,
}

/// One active upload slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcUpload {
    /// Remote peer address.
    pub peer_address: String,
    /// Remote peer port.
    pub peer_port: u16,
    /// Peer client software string.
    pub client_software: Option<String>,
    /// Hash of the file being uploaded.
    pub file_hash: Option<String>,
    /// Upload speed in bytes per second.
    pub speed: u64,
    /// Bytes transferred to this peer.
    pub transferred: u64,
}

/// A native category record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcCategory {
    /// Native numeric id.
    pub id: u32,
    /// Category title.
    pub title: String,
    /// Incoming path for the category.
    pub path: String,
    /// Free-form comment.
    pub comment: String,
    /// Packed BGR color.
    pub color: u32,
    /// Native priority code.
    pub priority: u8,
}

/// One search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcSearchHit {
    /// 32-hex ed2k hash.
    pub hash: String,
    /// File name.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Known sources.
    pub sources: u32,
    /// Sources with the complete file.
    pub complete_sources: u32,
}

/// Daemon preferences the adapter cares about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcPreferences {
    /// Default incoming directory.
    pub incoming_dir: Option<String>,
}

/// Semantic EC operations. Implementations own the socket, the binary
/// codec, and protocol-level retries; every method is one logical request.
///
/// `stats()` returns a flat JSON object with at least `uploadSpeed`,
/// `downloadSpeed`, `uploadTotal`, `downloadTotal`, `ed2kConnected`,
/// `highId`, `kadConnected`, `listenPort`, and optionally `pid`.
#[async_trait]
pub trait EcTransport: Send + Sync {
    /// Open the socket and authenticate.
    async fn connect(&self, password: &str) -> anyhow::Result<()>;

    /// Cheap version probe used by the connect-time health check.
    async fn version(&self) -> anyhow::Result<String>;

    /// Close the socket.
    async fn close(&self);

    /// Current download queue.
    async fn download_queue(&self) -> anyhow::Result<Vec<EcDownload>>;

    /// Current shared files.
    async fn shared_files(&self) -> anyhow::Result<Vec<EcSharedFile>>;

    /// Current upload slots.
    async fn upload_queue(&self) -> anyhow::Result<Vec<EcUpload>>;

    /// Raw statistics object (shape documented on the trait).
    async fn stats(&self) -> anyhow::Result<Value>;

    /// Pause a download.
    async fn pause_file(&self, hash: &str) -> anyhow::Result<()>;

    /// Resume a paused download.
    async fn resume_file(&self, hash: &str) -> anyhow::Result<()>;

    /// Stop a download.
    async fn stop_file(&self, hash: &str) -> anyhow::Result<()>;

    /// Cancel a download, removing its partial data.
    async fn cancel_file(&self, hash: &str) -> anyhow::Result<()>;

    /// Add an `ed2k://` link; returns the hash of the new download.
    async fn add_link(&self, link: &str, category_id: Option<u32>) -> anyhow::Result<String>;

    /// Start a download from an earlier search hit.
    async fn download_search_result(
        &self,
        hash: &str,
        category_id: Option<u32>,
    ) -> anyhow::Result<()>;

    /// Assign a native category id to a download.
    async fn set_file_category(&self, hash: &str, category_id: u32) -> anyhow::Result<()>;

    /// Native category list.
    async fn categories(&self) -> anyhow::Result<Vec<EcCategory>>;

    /// Create a native category; returns the assigned id.
    async fn create_category(&self, category: &EcCategory) -> anyhow::Result<u32>;

    /// Update a native category (title changes implement rename).
    async fn update_category(&self, category: &EcCategory) -> anyhow::Result<()>;

    /// Delete a native category by id.
    async fn delete_category(&self, id: u32) -> anyhow::Result<()>;

    /// Trigger a shared-files rescan.
    async fn refresh_shared(&self) -> anyhow::Result<()>;

    /// Run a search to completion and collect the hits.
    async fn search(
        &self,
        query: &str,
        file_type: Option<&str>,
        min_size: Option<u64>,
        max_size: Option<u64>,
    ) -> anyhow::Result<Vec<EcSearchHit>>;

    /// Daemon log tail.
    async fn log(&self) -> anyhow::Result<String>;

    /// Daemon preferences.
    async fn preferences(&self) -> anyhow::Result<EcPreferences>;

    /// Known ed2k servers.
    async fn servers(&self) -> anyhow::Result<Vec<ServerInfo>>;

    /// Run a server action (`connect`, `disconnect`, `remove`).
    async fn server_action(&self, action: &str, address: &str) -> anyhow::Result<()>;
}
