//! Category manager behaviour against recording fake clients.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use peerdeck_categories::{Category, CategoryError, CategoryManager, FsPathValidator};
use peerdeck_core::{
    AddOptions, CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity,
    ClientKind, ClientRegistry, DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch,
    NetworkClass, NetworkHealth, NetworkStatus, SearchQuery, SearchResult, TransferMetrics,
    UnifiedPriority,
};
use peerdeck_events::EventBus;
use serde_json::Value;

#[derive(Default)]
struct Recorded {
    ensured: Vec<String>,
    batches: Vec<usize>,
    edited: Vec<String>,
    renamed: Vec<(String, String)>,
    deleted: Vec<String>,
}

struct FakeClient {
    kind: ClientKind,
    instance_id: String,
    connected: AtomicBool,
    recorded: Mutex<Recorded>,
    assign_amule_ids: bool,
}

impl FakeClient {
    fn new(kind: ClientKind, instance_id: &str, assign_amule_ids: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            instance_id: instance_id.to_string(),
            connected: AtomicBool::new(true),
            recorded: Mutex::new(Recorded::default()),
            assign_amule_ids,
        })
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }
}

#[async_trait]
impl ClientAdapter for FakeClient {
    fn kind(&self) -> ClientKind {
        self.kind
    }

    fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            instance_id: self.instance_id.clone(),
            kind: self.kind,
            display_name: self.instance_id.clone(),
        }
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

    async fn add_magnet(&self, _uri: &str, _opts: &AddOptions) -> anyhow::Result<String> {
        Ok(String::new())
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

    async fn search(&self, _query: &SearchQuery) -> anyhow::Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }

    async fn ensure_category_exists(
        &self,
        spec: &CategorySpec,
    ) -> anyhow::Result<EnsureCategoryOutcome> {
        self.recorded().ensured.push(spec.name.clone());
        Ok(EnsureCategoryOutcome {
            amule_id: self.assign_amule_ids.then_some(7),
        })
    }

    async fn ensure_categories_batch(&self, specs: &[CategorySpec]) -> anyhow::Result<()> {
        self.recorded().batches.push(specs.len());
        Ok(())
    }

    async fn edit_category(&self, spec: &CategorySpec) -> anyhow::Result<CategoryEditOutcome> {
        self.recorded().edited.push(spec.name.clone());
        Ok(CategoryEditOutcome {
            verified: true,
            mismatches: Vec::new(),
        })
    }

    async fn rename_category(&self, old_name: &str, new_name: &str) -> anyhow::Result<()> {
        self.recorded()
            .renamed
            .push((old_name.to_string(), new_name.to_string()));
        Ok(())
    }

    async fn delete_category(&self, name: &str) -> anyhow::Result<()> {
        self.recorded().deleted.push(name.to_string());
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
            listen_port: Some(4662),
        }
    }
}

async fn setup() -> (CategoryManager, Arc<FakeClient>, Arc<FakeClient>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ClientRegistry::new());
    let amule = FakeClient::new(ClientKind::Amule, "amule-host-4712", true);
    let qb = FakeClient::new(ClientKind::QBittorrent, "qbittorrent-host-8080", false);
    registry
        .register("amule-host-4712", ClientKind::Amule, amule.clone(), "mule")
        .await
        .unwrap();
    registry
        .register("qbittorrent-host-8080", ClientKind::QBittorrent, qb.clone(), "qb")
        .await
        .unwrap();

    let manager = CategoryManager::load(
        dir.path().join("categories.json"),
        registry,
        EventBus::with_capacity(64),
        Arc::new(FsPathValidator),
    )
    .unwrap();
    (manager, amule, qb, dir)
}

#[tokio::test]
async fn default_category_always_persisted() {
    let (_manager, _amule, _qb, dir) = setup().await;
    let raw = std::fs::read_to_string(dir.path().join("categories.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let names: Vec<&str> = doc["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|category| category["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Default"));
}

#[tokio::test]
async fn create_propagates_and_links_amule_id() {
    let (manager, amule, qb, _dir) = setup().await;
    let created = manager
        .create(Category {
            name: "Movies".to_string(),
            color: "#ff0000".to_string(),
            path: Some("/srv/movies".to_string()),
            ..Category::default()
        })
        .await
        .unwrap();
    assert_eq!(created.name, "Movies");

    assert_eq!(amule.recorded().ensured, vec!["Movies"]);
    assert_eq!(qb.recorded().ensured, vec!["Movies"]);

    let reloaded = manager.get("Movies").await.unwrap();
    assert_eq!(reloaded.amule_ids.get("amule-host-4712"), Some(&7));

    let snapshot = manager.snapshot().await;
    let unlinked = snapshot.unlinked_for("amule-host-4712", NetworkClass::Ed2k);
    assert!(unlinked.iter().all(|category| category.name != "Movies"));
    assert!(snapshot
        .unlinked_for("qbittorrent-host-8080", NetworkClass::BitTorrent)
        .is_empty());
}

#[tokio::test]
async fn rename_default_is_rejected_with_exact_message() {
    let (manager, _amule, _qb, _dir) = setup().await;
    let err = manager.rename("Default", "Anything").await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot rename Default category");
    assert!(matches!(err, CategoryError::CannotRenameDefault));

    let err = manager.delete("Default").await.unwrap_err();
    assert!(matches!(err, CategoryError::CannotDeleteDefault));
}

#[tokio::test]
async fn delete_syncs_every_capable_client_and_persists() {
    let (manager, amule, qb, dir) = setup().await;
    manager
        .create(Category {
            name: "Temp".to_string(),
            color: "#00ff00".to_string(),
            ..Category::default()
        })
        .await
        .unwrap();

    manager.delete("Temp").await.unwrap();
    assert_eq!(amule.recorded().deleted, vec!["Temp"]);
    assert_eq!(qb.recorded().deleted, vec!["Temp"]);
    assert!(manager.get("Temp").await.is_none());

    let raw = std::fs::read_to_string(dir.path().join("categories.json")).unwrap();
    assert!(!raw.contains("\"Temp\""));
}

#[tokio::test]
async fn propagation_excludes_the_originating_instance() {
    let (manager, amule, qb, _dir) = setup().await;
    manager.propagate_to_other_clients("amule-host-4712").await;
    assert!(amule.recorded().batches.is_empty());
    assert_eq!(qb.recorded().batches.len(), 1);
}

#[tokio::test]
async fn import_is_idempotent() {
    let (manager, _amule, _qb, _dir) = setup().await;
    let spec = CategorySpec {
        name: "FromClient".to_string(),
        path: Some("/incoming".to_string()),
        comment: String::new(),
        color: "#123456".to_string(),
        priority: None,
    };
    manager.import_category(&spec).await.unwrap();
    manager.import_category(&spec).await.unwrap();
    let names: Vec<String> = manager
        .list()
        .await
        .into_iter()
        .map(|category| category.name)
        .collect();
    assert_eq!(names.iter().filter(|name| *name == "FromClient").count(), 1);

    let mut mappings = BTreeMap::new();
    mappings.insert("amule".to_string(), "/data/from-client".to_string());
    let (updated, mismatches) = manager
        .update(
            "FromClient",
            peerdeck_categories::CategoryUpdate {
                path_mappings: Some(mappings),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(mismatches.is_empty());
    assert_eq!(
        updated.path_mappings.get("amule").map(String::as_str),
        Some("/data/from-client")
    );
}
