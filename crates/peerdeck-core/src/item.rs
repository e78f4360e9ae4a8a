//! The unified cross-client item model produced by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::meta::ClientKind;

/// Unified lifecycle status across all client kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Actively transferring.
    Active,
    /// Paused by the user.
    Paused,
    /// Stopped; no transfer and no queue slot.
    Stopped,
    /// Complete and uploading to peers.
    Seeding,
    /// Hashing or verifying payload data.
    Checking,
    /// Being relocated by a move operation; overrides the native status.
    Moving,
    /// Waiting in the client's queue.
    Queued,
    /// The client reported an error condition.
    Error,
    /// Native status not covered by the translation table.
    Unknown,
}

/// Unified priority scale shared by all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum UnifiedPriority {
    /// Default priority.
    Normal = 0,
    /// Elevated priority.
    High = 1,
    /// Reduced priority.
    Low = 2,
    /// Let the client decide.
    Auto = 3,
}

impl UnifiedPriority {
    /// Decode the numeric wire form (`0=Normal, 1=High, 2=Low, 3=Auto`).
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Normal),
            1 => Some(Self::High),
            2 => Some(Self::Low),
            3 => Some(Self::Auto),
            _ => None,
        }
    }

    /// Numeric wire form.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Durable cross-instance identity: `instanceId:hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompoundKey {
    /// Instance the item lives on.
    pub instance_id: String,
    /// Lowercase content hash.
    pub hash: String,
}

impl CompoundKey {
    /// Build a key, lowercasing the hash.
    #[must_use]
    pub fn new(instance_id: impl Into<String>, hash: &str) -> Self {
        Self {
            instance_id: instance_id.into(),
            hash: hash.to_ascii_lowercase(),
        }
    }

    /// Parse the `instanceId:hash` form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedCompoundKey`] when no separator exists
    /// or either side is empty.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.split_once(':') {
            Some((instance, hash)) if !instance.is_empty() && !hash.is_empty() => {
                Ok(Self::new(instance, hash))
            }
            _ => Err(CoreError::MalformedCompoundKey(raw.to_string())),
        }
    }
}

impl std::fmt::Display for CompoundKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.instance_id, self.hash)
    }
}

impl TryFrom<String> for CompoundKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CompoundKey> for String {
    fn from(key: CompoundKey) -> Self {
        key.to_string()
    }
}

/// Geographic enrichment attached to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// ISO country code.
    pub country: String,
    /// City name, when known.
    pub city: Option<String>,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

/// A remote peer observed by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    /// Remote address (IP or hostname as reported).
    pub address: String,
    /// Remote port.
    pub port: u16,
    /// Client software string, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    /// Bytes per second we upload to this peer.
    #[serde(default)]
    pub upload_rate: u64,
    /// Bytes per second we download from this peer.
    #[serde(default)]
    pub download_rate: u64,
    /// Peer's reported completion (0..1), when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// GeoIP enrichment, filled by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
    /// Reverse-DNS name, filled by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Source/peer counters for an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCounts {
    /// Total known sources.
    pub total: u32,
    /// Currently connected sources.
    pub connected: u32,
    /// Sources that have the complete payload.
    pub seeders: u32,
    /// ed2k only: sources queued as "asked for another file".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a4af: Option<u32>,
    /// ed2k only: sources without current parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_current: Option<u32>,
}

/// ed2k-specific extras carried on unified items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ed2kExtras {
    /// Canonical ed2k link for the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ed2k_link: Option<String>,
    /// Native numeric category id on the owning instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u32>,
    /// Part availability string, when the daemon reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_status: Option<String>,
}

/// Tracker detail for BitTorrent items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerInfo {
    /// Announce URL.
    pub url: String,
    /// Native tracker status label.
    pub status: String,
    /// Peers reported by this tracker, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<u32>,
}

/// BitTorrent-specific extras carried on unified items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentExtras {
    /// Current save path on the client host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Native label/category on the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Tracker list, populated by the tracker refresh loop.
    #[serde(default)]
    pub trackers: Vec<TrackerInfo>,
    /// Whether the torrent is private.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
}

/// The central cross-client record: one per `(instanceId, hash)` per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedItem {
    /// Lowercase content hash.
    pub hash: String,
    /// Owning instance id.
    pub instance_id: String,
    /// Owning client kind.
    pub client: ClientKind,
    /// Display name.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Bytes downloaded so far.
    pub size_downloaded: u64,
    /// Completion in `0.0..=1.0`.
    pub progress: f64,
    /// Current download speed in bytes per second.
    pub download_speed: u64,
    /// Current upload speed in bytes per second.
    pub upload_speed: u64,
    /// Unified status.
    pub status: ItemStatus,
    /// App-level category name.
    pub category: String,
    /// Whether the item is in the download list.
    pub downloading: bool,
    /// Whether the item is advertised as shared.
    pub shared: bool,
    /// Whether the payload is complete.
    pub complete: bool,
    /// Whether the item is actively seeding.
    pub seeding: bool,
    /// Source counters.
    pub sources: SourceCounts,
    /// Peers currently receiving data from us.
    #[serde(default)]
    pub active_uploads: Vec<Peer>,
    /// Total bytes uploaded for this item.
    pub upload_total: u64,
    /// Share ratio.
    pub ratio: f64,
    /// Estimated seconds to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    /// Full peer list, when detail fetches are enabled.
    #[serde(default)]
    pub peers_detailed: Vec<Peer>,
    /// Raw native record for debugging surfaces.
    #[serde(default)]
    pub raw: Value,
    /// When the item was first added, backfilled from history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// ed2k extras; exactly one of `ed2k`/`torrent` is populated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ed2k: Option<Ed2kExtras>,
    /// BitTorrent extras; exactly one of `ed2k`/`torrent` is populated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torrent: Option<TorrentExtras>,
    /// Move overlay: fraction moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_progress: Option<f64>,
    /// Move overlay: lifecycle label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_status: Option<String>,
    /// Move overlay: files moved so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_files_moved: Option<u64>,
    /// Move overlay: total files to move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_files_total: Option<u64>,
    /// Move overlay: file currently being copied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_current_file: Option<String>,
    /// Per-connection annotation: whether the receiving user owns the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by_me: Option<bool>,
}

impl UnifiedItem {
    /// Minimal item used as the assembly starting point.
    #[must_use]
    pub fn new(instance_id: impl Into<String>, kind: ClientKind, hash: &str, name: &str) -> Self {
        Self {
            hash: hash.to_ascii_lowercase(),
            instance_id: instance_id.into(),
            client: kind,
            name: name.to_string(),
            size: 0,
            size_downloaded: 0,
            progress: 0.0,
            download_speed: 0,
            upload_speed: 0,
            status: ItemStatus::Unknown,
            category: String::new(),
            downloading: false,
            shared: false,
            complete: false,
            seeding: false,
            sources: SourceCounts::default(),
            active_uploads: Vec::new(),
            upload_total: 0,
            ratio: 0.0,
            eta: None,
            peers_detailed: Vec::new(),
            raw: Value::Null,
            added_at: None,
            ed2k: None,
            torrent: None,
            move_progress: None,
            move_status: None,
            move_files_moved: None,
            move_files_total: None,
            move_current_file: None,
            owned_by_me: None,
        }
    }

    /// Compound key for this item.
    #[must_use]
    pub fn key(&self) -> CompoundKey {
        CompoundKey::new(self.instance_id.clone(), &self.hash)
    }

    /// Re-establish the cross-field invariants after assembly:
    /// `complete == (progress >= 1.0)` and `seeding ⇒ complete`.
    pub fn reconcile(&mut self) {
        if self.progress >= 1.0 {
            self.progress = 1.0;
            self.complete = true;
        }
        if self.complete {
            self.downloading = false;
            self.size_downloaded = self.size;
        } else if self.seeding {
            // Seeding without a complete payload cannot happen; trust the
            // seeding signal and mark the item complete.
            self.complete = true;
            self.progress = 1.0;
            self.downloading = false;
            self.size_downloaded = self.size;
        }
        if self.seeding {
            self.shared = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_key_round_trips() {
        let key = CompoundKey::new("amule-host-4712", "ABCDEF0123456789ABCDEF0123456789");
        assert_eq!(
            key.to_string(),
            "amule-host-4712:abcdef0123456789abcdef0123456789"
        );
        assert_eq!(CompoundKey::parse(&key.to_string()).unwrap(), key);
        assert!(CompoundKey::parse("nocolon").is_err());
        assert!(CompoundKey::parse(":hash").is_err());
    }

    #[test]
    fn reconcile_enforces_completion_invariants() {
        let mut item = UnifiedItem::new("qb-1", ClientKind::QBittorrent, "AB", "demo");
        item.size = 100;
        item.progress = 1.2;
        item.downloading = true;
        item.reconcile();
        assert!(item.complete);
        assert!(!item.downloading);
        assert_eq!(item.size_downloaded, 100);
        assert!((item.progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn seeding_implies_complete() {
        let mut item = UnifiedItem::new("qb-1", ClientKind::QBittorrent, "AB", "demo");
        item.size = 10;
        item.progress = 0.4;
        item.seeding = true;
        item.reconcile();
        assert!(item.complete);
        assert!(item.shared);
    }

    #[test]
    fn priority_codes_round_trip() {
        for code in 0..=3 {
            assert_eq!(UnifiedPriority::from_code(code).unwrap().code(), code);
        }
        assert!(UnifiedPriority::from_code(4).is_none());
    }
}
