//! Cross-client assembly: one `UnifiedItem` per `(instanceId, hash)`.

use std::collections::HashMap;

use peerdeck_core::{FetchBatch, ItemStatus, UnifiedItem};

/// Merge per-instance fetch batches into the unified item list.
///
/// Downloads seed the map. Shared files either merge into their download
/// (ed2k: presence in the shared list is the completion signal) or join as
/// standalone complete items. Upload slots attach to their item as active
/// uploads. BitTorrent adapters return the download list as their shared
/// list, which the merge naturally collapses.
#[must_use]
pub fn assemble_items(batches: Vec<FetchBatch>) -> Vec<UnifiedItem> {
    let mut items: HashMap<(String, String), UnifiedItem> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();

    for batch in &batches {
        for download in &batch.downloads {
            let key = (download.instance_id.clone(), download.hash.clone());
            if items.insert(key.clone(), download.clone()).is_none() {
                order.push(key);
            }
        }
    }

    for batch in &batches {
        for shared in &batch.shared_files {
            let key = (shared.instance_id.clone(), shared.hash.clone());
            match items.get_mut(&key) {
                Some(existing) => {
                    existing.shared = true;
                    if shared.complete {
                        // The shared list is the completion signal.
                        existing.complete = true;
                        existing.seeding = existing.seeding || shared.seeding;
                        existing.progress = 1.0;
                        if existing.status == ItemStatus::Unknown {
                            existing.status = shared.status;
                        }
                    }
                    existing.upload_total = existing.upload_total.max(shared.upload_total);
                    existing.reconcile();
                }
                None => {
                    items.insert(key.clone(), shared.clone());
                    order.push(key);
                }
            }
        }
    }

    for batch in &batches {
        for slot in &batch.uploads {
            let Some(hash) = &slot.hash else {
                continue;
            };
            // Upload slots carry no instance ambiguity: every batch only
            // holds slots of the instance that produced it.
            let instance_id = batch
                .downloads
                .first()
                .or_else(|| batch.shared_files.first())
                .map(|item| item.instance_id.clone());
            let Some(instance_id) = instance_id else {
                continue;
            };
            if let Some(item) = items.get_mut(&(instance_id, hash.clone())) {
                item.active_uploads.push(slot.peer.clone());
                item.upload_speed += slot.peer.upload_rate;
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| items.remove(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerdeck_core::{ClientKind, Peer, UploadSlot};

    fn download(instance: &str, hash: &str, progress: f64) -> UnifiedItem {
        let mut item = UnifiedItem::new(instance, ClientKind::Amule, hash, "file.bin");
        item.size = 100;
        item.progress = progress;
        item.downloading = true;
        item.status = ItemStatus::Active;
        item
    }

    fn shared(instance: &str, hash: &str) -> UnifiedItem {
        let mut item = UnifiedItem::new(instance, ClientKind::Amule, hash, "file.bin");
        item.size = 100;
        item.progress = 1.0;
        item.complete = true;
        item.seeding = true;
        item.shared = true;
        item.status = ItemStatus::Seeding;
        item.upload_total = 42;
        item
    }

    #[test]
    fn one_item_per_instance_and_hash() {
        let batch_a = FetchBatch {
            downloads: vec![download("amule-a-1", "aa", 0.5)],
            shared_files: Vec::new(),
            uploads: Vec::new(),
        };
        let batch_b = FetchBatch {
            downloads: vec![download("amule-b-1", "aa", 0.7)],
            shared_files: Vec::new(),
            uploads: Vec::new(),
        };
        let items = assemble_items(vec![batch_a, batch_b]);
        assert_eq!(items.len(), 2, "same hash on two instances stays two items");
        let instances: Vec<&str> = items.iter().map(|item| item.instance_id.as_str()).collect();
        assert!(instances.contains(&"amule-a-1"));
        assert!(instances.contains(&"amule-b-1"));
        assert!(items.iter().all(|item| item.hash == "aa"));
    }

    #[test]
    fn shared_presence_completes_the_download() {
        let batch = FetchBatch {
            downloads: vec![download("amule-a-1", "aa", 0.99)],
            shared_files: vec![shared("amule-a-1", "aa")],
            uploads: Vec::new(),
        };
        let items = assemble_items(vec![batch]);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert!(item.complete && item.shared && item.seeding);
        assert!(!item.downloading);
        assert_eq!(item.upload_total, 42);
    }

    #[test]
    fn standalone_shared_files_join_the_list() {
        let batch = FetchBatch {
            downloads: Vec::new(),
            shared_files: vec![shared("amule-a-1", "bb")],
            uploads: Vec::new(),
        };
        let items = assemble_items(vec![batch]);
        assert_eq!(items.len(), 1);
        assert!(items[0].complete);
    }

    #[test]
    fn bittorrent_identical_lists_collapse() {
        let item = download("qb-a-1", "cc", 0.4);
        let batch = FetchBatch {
            shared_files: vec![item.clone()],
            downloads: vec![item],
            uploads: Vec::new(),
        };
        let items = assemble_items(vec![batch]);
        assert_eq!(items.len(), 1);
        assert!(!items[0].complete, "incomplete torrent is not completed by the merge");
    }

    #[test]
    fn upload_slots_attach_to_their_item() {
        let mut batch = FetchBatch {
            downloads: vec![download("amule-a-1", "aa", 0.5)],
            shared_files: Vec::new(),
            uploads: Vec::new(),
        };
        batch.uploads.push(UploadSlot {
            hash: Some("aa".to_string()),
            peer: Peer {
                address: "198.51.100.9".to_string(),
                port: 4662,
                upload_rate: 55,
                ..Peer::default()
            },
        });
        let items = assemble_items(vec![batch]);
        assert_eq!(items[0].active_uploads.len(), 1);
        assert_eq!(items[0].upload_speed, 55);
    }
}
