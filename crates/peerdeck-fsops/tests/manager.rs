//! Move manager end-to-end over a fake adapter and real temp filesystems.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use peerdeck_categories::{CategoryManager, FsPathValidator};
use peerdeck_core::{
    CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity, ClientKind,
    ClientRegistry, CompoundKey, DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch,
    NetworkHealth, NetworkStatus, TransferMetrics, UnifiedPriority,
};
use peerdeck_data::{open_memory_pool, MoveOpStatus, MoveOpsStore};
use peerdeck_events::{Event, EventBus};
use peerdeck_fsops::{MoveManager, QueueMoveRequest};
use serde_json::Value;

struct FakeAdapter {
    paused: AtomicBool,
}

#[async_trait]
impl ClientAdapter for FakeAdapter {
    fn kind(&self) -> ClientKind {
        ClientKind::Amule
    }

    fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            instance_id: "amule-host-4712".to_string(),
            kind: ClientKind::Amule,
            display_name: "mule".to_string(),
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn init_client(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn shutdown(&self) {}

    async fn fetch_data(&self, _hint: &[CategorySpec]) -> anyhow::Result<FetchBatch> {
        Ok(FetchBatch::default())
    }

    async fn pause(&self, _hash: &str) -> anyhow::Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self, _hash: &str) -> anyhow::Result<()> {
        self.paused.store(false, Ordering::SeqCst);
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
            status: NetworkHealth::Green,
            text: "ok".to_string(),
            port_open: true,
            listen_port: None,
        }
    }
}

#[tokio::test]
async fn queued_move_copies_verifies_and_emits() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("incoming/Film.iso");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, vec![9_u8; 2048]).unwrap();
    let dest_dir = dir.path().join("movies");
    std::fs::create_dir_all(&dest_dir).unwrap();
    let dest = dest_dir.join("Film.iso");

    let registry = Arc::new(ClientRegistry::new());
    registry
        .register(
            "amule-host-4712",
            ClientKind::Amule,
            Arc::new(FakeAdapter {
                paused: AtomicBool::new(false),
            }),
            "mule",
        )
        .await
        .unwrap();

    let events = EventBus::with_capacity(32);
    let categories = CategoryManager::load(
        dir.path().join("categories.json"),
        registry.clone(),
        events.clone(),
        Arc::new(FsPathValidator),
    )
    .unwrap();
    let store = MoveOpsStore::new(open_memory_pool().await.unwrap()).await.unwrap();

    let manager = MoveManager::new(registry, categories, store.clone(), events.clone());
    let _worker = manager.spawn_worker();
    let mut stream = events.subscribe(None);

    manager
        .queue_move(QueueMoveRequest {
            compound_key: CompoundKey::new("amule-host-4712", "aabbccdd"),
            name: "Film.iso".to_string(),
            source_path_remote: source.display().to_string(),
            dest_path_local: dest.display().to_string(),
            dest_path_remote: dest.display().to_string(),
            total_size: 2048,
            is_multi_file: false,
            category_name: "Movies".to_string(),
        })
        .await
        .unwrap();

    // Queueing twice while active is rejected.
    let duplicate = manager
        .queue_move(QueueMoveRequest {
            compound_key: CompoundKey::new("amule-host-4712", "aabbccdd"),
            name: "Film.iso".to_string(),
            source_path_remote: source.display().to_string(),
            dest_path_local: dest.display().to_string(),
            dest_path_remote: dest.display().to_string(),
            total_size: 2048,
            is_multi_file: false,
            category_name: "Movies".to_string(),
        })
        .await;
    assert!(duplicate.is_err());

    let moved = loop {
        let envelope = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
            .await
            .expect("move should finish quickly")
            .expect("bus stays open");
        match envelope.event {
            Event::FileMoved { compound_key, .. } => break compound_key,
            Event::MoveFailed { message, .. } => panic!("move failed: {message}"),
            _ => {}
        }
    };
    assert_eq!(moved, "amule-host-4712:aabbccdd");

    assert!(dest.exists(), "payload landed at the destination");
    assert!(!source.exists(), "source removed after verification");

    let row = store.get("amule-host-4712:aabbccdd").await.unwrap().unwrap();
    assert_eq!(row.status, MoveOpStatus::Done);
}
