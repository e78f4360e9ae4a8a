//! End-to-end pipeline ticks over fake adapters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use peerdeck_categories::{CategoryManager, FsPathValidator};
use peerdeck_core::{
    CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity, ClientKind,
    ClientRegistry, DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch, ItemStatus,
    NetworkHealth, NetworkStatus, TransferMetrics, UnifiedItem, UnifiedPriority,
};
use peerdeck_data::{
    open_memory_pool, HistoryStore, MetricsStore, MoveOpRow, MoveOpStatus, MoveOpsStore,
    OwnershipStore, UserStore,
};
use peerdeck_events::EventBus;
use peerdeck_pipeline::{DataFetchService, NoopResolver, PipelineDeps};
use serde_json::Value;

struct FakeAdapter {
    identity: ClientIdentity,
    connected: AtomicBool,
    downloads: Vec<UnifiedItem>,
}

impl FakeAdapter {
    fn new(instance_id: &str, downloads: Vec<UnifiedItem>) -> Arc<Self> {
        Arc::new(Self {
            identity: ClientIdentity {
                instance_id: instance_id.to_string(),
                kind: ClientKind::Amule,
                display_name: instance_id.to_string(),
            },
            connected: AtomicBool::new(true),
            downloads,
        })
    }
}

#[async_trait]
impl ClientAdapter for FakeAdapter {
    fn kind(&self) -> ClientKind {
        ClientKind::Amule
    }

    fn identity(&self) -> ClientIdentity {
        self.identity.clone()
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn init_client(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn shutdown(&self) {}

    async fn fetch_data(&self, _hint: &[CategorySpec]) -> anyhow::Result<FetchBatch> {
        Ok(FetchBatch {
            downloads: self.downloads.clone(),
            shared_files: self.downloads.clone(),
            uploads: Vec::new(),
        })
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
            status: NetworkHealth::Green,
            text: "ok".to_string(),
            port_open: true,
            listen_port: None,
        }
    }
}

fn item(instance: &str, hash: &str, progress: f64) -> UnifiedItem {
    let mut item = UnifiedItem::new(instance, ClientKind::Amule, hash, "Film.iso");
    item.size = 1_000;
    item.progress = progress;
    item.downloading = progress < 1.0;
    item.status = ItemStatus::Active;
    item
}

struct Harness {
    service: Arc<DataFetchService>,
    moves: MoveOpsStore,
    _dir: tempfile::TempDir,
}

async fn harness(adapters: Vec<(&str, Arc<FakeAdapter>)>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ClientRegistry::new());
    for (id, adapter) in adapters {
        registry
            .register(id, ClientKind::Amule, adapter, id)
            .await
            .unwrap();
    }
    let events = EventBus::with_capacity(64);
    let categories = CategoryManager::load(
        dir.path().join("categories.json"),
        registry.clone(),
        events.clone(),
        Arc::new(FsPathValidator),
    )
    .unwrap();

    let users_pool = open_memory_pool().await.unwrap();
    let _users = UserStore::new(users_pool.clone()).await.unwrap();
    let ownership = OwnershipStore::new(users_pool).await.unwrap();
    let history = HistoryStore::new(open_memory_pool().await.unwrap()).await.unwrap();
    let moves = MoveOpsStore::new(open_memory_pool().await.unwrap()).await.unwrap();
    let _metrics = MetricsStore::new(open_memory_pool().await.unwrap()).await.unwrap();

    let service = DataFetchService::new(PipelineDeps {
        registry,
        categories,
        history,
        moves: moves.clone(),
        ownership,
        geoip: Arc::new(NoopResolver),
        hosts: Arc::new(NoopResolver),
        events,
        history_enabled: true,
    });
    Harness {
        service,
        moves,
        _dir: dir,
    }
}

#[tokio::test]
async fn same_hash_on_two_instances_stays_two_items() {
    let shared_hash = "abcdef0123456789abcdef0123456789";
    let harness = harness(vec![
        ("amule-a-4712", FakeAdapter::new("amule-a-4712", vec![item("amule-a-4712", shared_hash, 0.3)])),
        ("amule-b-4712", FakeAdapter::new("amule-b-4712", vec![item("amule-b-4712", shared_hash, 0.9)])),
    ])
    .await;

    let snapshot = harness.service.run_tick().await.unwrap();
    assert_eq!(snapshot.items.len(), 2);
    assert!(snapshot.items.iter().all(|item| item.hash == shared_hash));
    let mut instances: Vec<&str> = snapshot
        .items
        .iter()
        .map(|item| item.instance_id.as_str())
        .collect();
    instances.sort_unstable();
    assert_eq!(instances, vec!["amule-a-4712", "amule-b-4712"]);

    // The cache is populated and fresh (well within one tick period).
    let cached = harness.service.cached_batch(3_000).await;
    assert!(cached.is_some());
    assert_eq!(cached.unwrap().items.len(), 2);
}

#[tokio::test]
async fn move_overlay_overrides_status() {
    let hash = "ffffffffffffffffffffffffffffffff";
    let harness = harness(vec![(
        "amule-a-4712",
        FakeAdapter::new("amule-a-4712", vec![item("amule-a-4712", hash, 1.0)]),
    )])
    .await;

    harness
        .moves
        .upsert(&MoveOpRow {
            compound_key: format!("amule-a-4712:{hash}"),
            name: "Film.iso".to_string(),
            client_type: "amule".to_string(),
            source_path_remote: "/srv/in/Film.iso".to_string(),
            dest_path_local: "/data/movies/Film.iso".to_string(),
            dest_path_remote: "/data/movies/Film.iso".to_string(),
            total_size: 1_000,
            bytes_moved: 400,
            files_total: Some(1),
            files_moved: Some(0),
            current_file: Some("Film.iso".to_string()),
            is_multi_file: false,
            status: MoveOpStatus::Moving,
            error_message: None,
            category_name: "Movies".to_string(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let snapshot = harness.service.run_tick().await.unwrap();
    let moving = &snapshot.items[0];
    assert_eq!(moving.status, ItemStatus::Moving);
    assert_eq!(moving.move_status.as_deref(), Some("moving"));
    assert!((moving.move_progress.unwrap() - 0.4).abs() < 1e-9);
    assert_eq!(moving.move_current_file.as_deref(), Some("Film.iso"));
}

#[tokio::test]
async fn ticks_survive_empty_registries() {
    let harness = harness(Vec::new()).await;
    let snapshot = harness.service.run_tick().await.unwrap();
    assert!(snapshot.items.is_empty());
    assert!(harness.service.latest_batch().await.is_some());
}
