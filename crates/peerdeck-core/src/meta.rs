//! Static capability metadata for every supported client kind.
//!
//! The meta table is the single source of truth for per-type behavioural
//! branching: callers consult a capability flag instead of matching on the
//! kind directly.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::item::{ItemStatus, UnifiedPriority};

/// Closed set of supported backend client types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// aMule / ed2k network daemon controlled over the EC protocol.
    Amule,
    /// qBittorrent controlled over its WebUI HTTP API.
    QBittorrent,
    /// rTorrent controlled over XML-RPC.
    RTorrent,
}

impl ClientKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 3] = [Self::Amule, Self::QBittorrent, Self::RTorrent];

    /// Canonical lowercase label used in instance ids, config, and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amule => "amule",
            Self::QBittorrent => "qbittorrent",
            Self::RTorrent => "rtorrent",
        }
    }

    /// Parse a config/wire label into a kind.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKind`] for labels outside the closed set.
    pub fn parse(label: &str) -> Result<Self, CoreError> {
        match label.to_ascii_lowercase().as_str() {
            "amule" => Ok(Self::Amule),
            "qbittorrent" => Ok(Self::QBittorrent),
            "rtorrent" => Ok(Self::RTorrent),
            other => Err(CoreError::UnknownKind(other.to_string())),
        }
    }

    /// Static capability record for this kind.
    #[must_use]
    pub const fn meta(self) -> &'static ClientMeta {
        match self {
            Self::Amule => &AMULE_META,
            Self::QBittorrent => &QBITTORRENT_META,
            Self::RTorrent => &RTORRENT_META,
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network family a client kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    /// eDonkey2000 network.
    Ed2k,
    /// BitTorrent network.
    BitTorrent,
}

/// Boolean feature switches consulted instead of kind checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityFlags {
    /// Client relocates downloads through its own API; the core delegates
    /// instead of copying bytes itself.
    pub native_move: bool,
    /// Changing the category/label makes the client move the payload on its
    /// own.
    pub category_change_auto_moves: bool,
    /// Client has no pause concept; stop stands in for pause.
    pub stop_replaces_pause: bool,
    /// Items can span multiple files.
    pub multi_file: bool,
    /// Client advertises a distinct shared-files list.
    pub shared_files: bool,
    /// Presence in the shared list implies the item is complete.
    pub shared_means_complete: bool,
    /// Removing a shared item requires deleting its files from disk.
    pub remove_shared_must_delete_files: bool,
    /// Moves must pause the item first and resume afterwards.
    pub pause_before_move: bool,
    /// Client exposes tracker lists.
    pub trackers: bool,
    /// Client supports interactive search.
    pub search: bool,
    /// Cancelling a download deletes its partial files.
    pub cancel_deletes_files: bool,
    /// The delete API can remove payload files itself.
    pub api_deletes_files: bool,
    /// The shared list must be refreshed after an on-disk delete.
    pub refresh_shared_after_delete: bool,
    /// Client has a native category/label concept to sync with.
    pub categories: bool,
    /// Client exposes a readable log.
    pub logs: bool,
}

/// Static per-kind capability record.
#[derive(Debug)]
pub struct ClientMeta {
    /// Kind the record describes.
    pub kind: ClientKind,
    /// Network family.
    pub network: NetworkClass,
    /// Content hash length in hex characters (32 for ed2k, 40 for BitTorrent).
    pub hash_len: usize,
    /// Prefix used when persisting telemetry samples for this kind.
    pub metrics_prefix: &'static str,
    /// Native status label → unified status.
    pub status_map: &'static [(&'static str, ItemStatus)],
    /// Unified statuses that count as seeding for this kind.
    pub seeding_statuses: &'static [ItemStatus],
    /// Unified priority → native priority label, when the client has one.
    pub priority_map: Option<&'static [(UnifiedPriority, &'static str)]>,
    /// Feature switches.
    pub flags: CapabilityFlags,
}

impl ClientMeta {
    /// Translate a native status label into the unified vocabulary.
    ///
    /// Unknown labels map to [`ItemStatus::Unknown`]; adapters log them once.
    #[must_use]
    pub fn unified_status(&self, native: &str) -> ItemStatus {
        self.status_map
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(native))
            .map_or(ItemStatus::Unknown, |(_, status)| *status)
    }

    /// Translate a unified priority into the client's native label.
    #[must_use]
    pub fn native_priority(&self, priority: UnifiedPriority) -> Option<&'static str> {
        self.priority_map?
            .iter()
            .find(|(unified, _)| *unified == priority)
            .map(|(_, native)| *native)
    }

    /// Whether a unified status counts as seeding for this kind.
    #[must_use]
    pub fn is_seeding_status(&self, status: ItemStatus) -> bool {
        self.seeding_statuses.contains(&status)
    }
}

static AMULE_META: ClientMeta = ClientMeta {
    kind: ClientKind::Amule,
    network: NetworkClass::Ed2k,
    hash_len: 32,
    metrics_prefix: "amule",
    status_map: &[
        ("downloading", ItemStatus::Active),
        ("waiting", ItemStatus::Active),
        ("hashing", ItemStatus::Checking),
        ("completing", ItemStatus::Checking),
        ("complete", ItemStatus::Seeding),
        ("paused", ItemStatus::Paused),
        ("erroneous", ItemStatus::Error),
        ("insufficient", ItemStatus::Error),
        ("allocating", ItemStatus::Checking),
    ],
    seeding_statuses: &[ItemStatus::Seeding],
    priority_map: Some(&[
        (UnifiedPriority::Normal, "normal"),
        (UnifiedPriority::High, "high"),
        (UnifiedPriority::Low, "low"),
        (UnifiedPriority::Auto, "auto"),
    ]),
    flags: CapabilityFlags {
        native_move: false,
        category_change_auto_moves: false,
        stop_replaces_pause: false,
        multi_file: false,
        shared_files: true,
        shared_means_complete: true,
        remove_shared_must_delete_files: true,
        pause_before_move: false,
        trackers: false,
        search: true,
        cancel_deletes_files: true,
        api_deletes_files: false,
        refresh_shared_after_delete: true,
        categories: true,
        logs: true,
    },
};

static QBITTORRENT_META: ClientMeta = ClientMeta {
    kind: ClientKind::QBittorrent,
    network: NetworkClass::BitTorrent,
    hash_len: 40,
    metrics_prefix: "qbittorrent",
    status_map: &[
        ("downloading", ItemStatus::Active),
        ("forcedDL", ItemStatus::Active),
        ("metaDL", ItemStatus::Active),
        ("stalledDL", ItemStatus::Active),
        ("queuedDL", ItemStatus::Queued),
        ("pausedDL", ItemStatus::Paused),
        ("stoppedDL", ItemStatus::Stopped),
        ("uploading", ItemStatus::Seeding),
        ("forcedUP", ItemStatus::Seeding),
        ("stalledUP", ItemStatus::Seeding),
        ("queuedUP", ItemStatus::Seeding),
        ("pausedUP", ItemStatus::Stopped),
        ("stoppedUP", ItemStatus::Stopped),
        ("checkingDL", ItemStatus::Checking),
        ("checkingUP", ItemStatus::Checking),
        ("checkingResumeData", ItemStatus::Checking),
        ("allocating", ItemStatus::Checking),
        ("moving", ItemStatus::Moving),
        ("error", ItemStatus::Error),
        ("missingFiles", ItemStatus::Error),
    ],
    seeding_statuses: &[ItemStatus::Seeding],
    priority_map: None,
    flags: CapabilityFlags {
        native_move: true,
        category_change_auto_moves: true,
        stop_replaces_pause: true,
        multi_file: true,
        shared_files: false,
        shared_means_complete: false,
        remove_shared_must_delete_files: false,
        pause_before_move: false,
        trackers: true,
        search: false,
        cancel_deletes_files: false,
        api_deletes_files: true,
        refresh_shared_after_delete: false,
        categories: true,
        logs: true,
    },
};

static RTORRENT_META: ClientMeta = ClientMeta {
    kind: ClientKind::RTorrent,
    network: NetworkClass::BitTorrent,
    hash_len: 40,
    metrics_prefix: "rtorrent",
    status_map: &[
        ("downloading", ItemStatus::Active),
        ("seeding", ItemStatus::Seeding),
        ("paused", ItemStatus::Paused),
        ("stopped", ItemStatus::Stopped),
        ("hashing", ItemStatus::Checking),
        ("error", ItemStatus::Error),
    ],
    seeding_statuses: &[ItemStatus::Seeding],
    priority_map: Some(&[
        (UnifiedPriority::Normal, "2"),
        (UnifiedPriority::High, "3"),
        (UnifiedPriority::Low, "1"),
        (UnifiedPriority::Auto, "2"),
    ]),
    flags: CapabilityFlags {
        native_move: false,
        category_change_auto_moves: false,
        stop_replaces_pause: false,
        multi_file: true,
        shared_files: false,
        shared_means_complete: false,
        remove_shared_must_delete_files: false,
        pause_before_move: true,
        trackers: true,
        search: false,
        cancel_deletes_files: false,
        api_deletes_files: false,
        refresh_shared_after_delete: false,
        categories: true,
        logs: false,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_round_trip() {
        for kind in ClientKind::ALL {
            assert_eq!(ClientKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(ClientKind::parse("transmission").is_err());
    }

    #[test]
    fn hash_lengths_match_network_class() {
        for kind in ClientKind::ALL {
            let meta = kind.meta();
            match meta.network {
                NetworkClass::Ed2k => assert_eq!(meta.hash_len, 32),
                NetworkClass::BitTorrent => assert_eq!(meta.hash_len, 40),
            }
        }
    }

    #[test]
    fn status_lookup_is_case_insensitive() {
        let meta = ClientKind::QBittorrent.meta();
        assert_eq!(meta.unified_status("STALLEDdl"), ItemStatus::Active);
        assert_eq!(meta.unified_status("no-such-state"), ItemStatus::Unknown);
    }

    #[test]
    fn amule_priorities_translate() {
        let meta = ClientKind::Amule.meta();
        assert_eq!(meta.native_priority(UnifiedPriority::High), Some("high"));
        assert!(ClientKind::QBittorrent
            .meta()
            .native_priority(UnifiedPriority::High)
            .is_none());
    }

    #[test]
    fn only_ed2k_requires_disk_delete_for_shared() {
        assert!(ClientKind::Amule.meta().flags.remove_shared_must_delete_files);
        assert!(!ClientKind::QBittorrent.meta().flags.remove_shared_must_delete_files);
        assert!(!ClientKind::RTorrent.meta().flags.remove_shared_must_delete_files);
    }
}
