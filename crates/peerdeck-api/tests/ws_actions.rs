//! WebSocket action dispatch against an in-memory context.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use peerdeck_api::AppContext;
use peerdeck_auth::{AuthManager, AuthedUser, Capability};
use peerdeck_categories::{CategoryManager, FsPathValidator};
use peerdeck_config::TrustedProxyConfig;
use peerdeck_core::{
    AddOptions, CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity,
    ClientKind, ClientRegistry, DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch,
    NetworkHealth, NetworkStatus, TransferMetrics, UnifiedPriority,
};
use peerdeck_data::{
    open_memory_pool, DataStores, HashStore, HistoryStore, MetricsStore, MoveOpsStore, NewUser,
    OwnershipStore, SessionStore, UserStore,
};
use peerdeck_events::EventBus;
use peerdeck_fsops::MoveManager;
use peerdeck_pipeline::{DataFetchService, NoopResolver, PipelineDeps};
use serde_json::{json, Value};

const MAGNET: &str = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=X";
const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

#[derive(Default)]
struct Recorded {
    magnets: Vec<String>,
    paused: Vec<String>,
    ensured: Vec<String>,
}

struct FakeBt {
    connected: AtomicBool,
    recorded: Mutex<Recorded>,
}

impl FakeBt {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            recorded: Mutex::new(Recorded::default()),
        })
    }
}

#[async_trait]
impl ClientAdapter for FakeBt {
    fn kind(&self) -> ClientKind {
        ClientKind::QBittorrent
    }

    fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            instance_id: "qbittorrent-host-8080".to_string(),
            kind: ClientKind::QBittorrent,
            display_name: "qb".to_string(),
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

    async fn pause(&self, hash: &str) -> anyhow::Result<()> {
        self.recorded.lock().unwrap().paused.push(hash.to_string());
        Ok(())
    }

    async fn resume(&self, _hash: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _hash: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn add_magnet(&self, uri: &str, _opts: &AddOptions) -> anyhow::Result<String> {
        self.recorded.lock().unwrap().magnets.push(uri.to_string());
        Ok(HASH.to_string())
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
        Ok(DeleteOutcome {
            success: true,
            paths_to_delete: Vec::new(),
        })
    }

    async fn get_files(&self, _hash: &str) -> anyhow::Result<Vec<ClientFile>> {
        Ok(Vec::new())
    }

    async fn ensure_category_exists(
        &self,
        spec: &CategorySpec,
    ) -> anyhow::Result<EnsureCategoryOutcome> {
        self.recorded.lock().unwrap().ensured.push(spec.name.clone());
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

struct Harness {
    ctx: peerdeck_api::SharedContext,
    adapter: Arc<FakeBt>,
    user_id: i64,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ClientRegistry::new());
    let adapter = FakeBt::new();
    registry
        .register(
            "qbittorrent-host-8080",
            ClientKind::QBittorrent,
            adapter.clone(),
            "qb",
        )
        .await
        .unwrap();

    let events = EventBus::with_capacity(128);
    let categories = CategoryManager::load(
        dir.path().join("categories.json"),
        registry.clone(),
        events.clone(),
        Arc::new(FsPathValidator),
    )
    .unwrap();

    let users_pool = open_memory_pool().await.unwrap();
    let users = UserStore::new(users_pool.clone()).await.unwrap();
    let ownership = OwnershipStore::new(users_pool).await.unwrap();
    let alice = users
        .create(&NewUser {
            username: "alice".to_string(),
            password_hash: None,
            is_admin: false,
            capabilities: vec!["add_downloads".to_string()],
        })
        .await
        .unwrap();

    let data = DataStores {
        users: users.clone(),
        ownership: ownership.clone(),
        sessions: SessionStore::new(open_memory_pool().await.unwrap()).await.unwrap(),
        history: HistoryStore::new(open_memory_pool().await.unwrap()).await.unwrap(),
        moves: MoveOpsStore::new(open_memory_pool().await.unwrap()).await.unwrap(),
        metrics: MetricsStore::new(open_memory_pool().await.unwrap()).await.unwrap(),
        hashes: HashStore::new(open_memory_pool().await.unwrap()).await.unwrap(),
    };

    let auth = Arc::new(AuthManager::new(
        users,
        data.sessions.clone(),
        "test-secret".to_string(),
        4,
        true,
    ));

    let moves = MoveManager::new(
        registry.clone(),
        categories.clone(),
        data.moves.clone(),
        events.clone(),
    );

    let service = DataFetchService::new(PipelineDeps {
        registry: registry.clone(),
        categories: categories.clone(),
        history: data.history.clone(),
        moves: data.moves.clone(),
        ownership,
        geoip: Arc::new(NoopResolver),
        hosts: Arc::new(NoopResolver),
        events: events.clone(),
        history_enabled: false,
    });

    let ctx = AppContext::new(
        registry,
        categories,
        auth,
        service,
        moves,
        data,
        events,
        dir.path().to_path_buf(),
        TrustedProxyConfig::default(),
        None,
    );
    Harness {
        ctx,
        adapter,
        user_id: alice.id,
        _dir: dir,
    }
}

fn user(id: i64, capabilities: &[Capability]) -> AuthedUser {
    AuthedUser {
        user_id: Some(id),
        username: "alice".to_string(),
        is_admin: false,
        capabilities: capabilities.iter().copied().collect::<HashSet<_>>(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn add_magnet_creates_category_and_records_ownership() {
    let harness = harness().await;
    let caller = user(harness.user_id, &[Capability::AddDownloads]);

    let replies = peerdeck_api::ws::handlers::dispatch(
        &harness.ctx,
        &caller,
        json!({
            "action": "addMagnetLinks",
            "links": [MAGNET],
            "label": "Movies",
        }),
    )
    .await;

    let added = replies
        .iter()
        .find(|reply| reply["type"] == "magnet-added")
        .expect("magnet-added reply");
    assert_eq!(added["results"][0]["success"], true);
    assert_eq!(added["results"][0]["link"], MAGNET);

    // The category was created app-wide and pushed to the capable client.
    assert!(harness.ctx.categories.get("Movies").await.is_some());
    assert!(replies.iter().any(|reply| reply["type"] == "categories-update"));
    assert!(harness
        .adapter
        .recorded
        .lock()
        .unwrap()
        .ensured
        .contains(&"Movies".to_string()));

    // Ownership landed under the compound key of the new download.
    let owner = harness
        .ctx
        .data
        .ownership
        .owner_of(&format!("qbittorrent-host-8080:{HASH}"))
        .await
        .unwrap();
    assert_eq!(owner, Some(harness.user_id));

    assert_eq!(
        harness.adapter.recorded.lock().unwrap().magnets,
        vec![MAGNET.to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn search_only_user_cannot_batch_pause() {
    let harness = harness().await;
    let caller = user(harness.user_id, &[Capability::Search]);

    let replies = peerdeck_api::ws::handlers::dispatch(
        &harness.ctx,
        &caller,
        json!({
            "action": "batchPause",
            "items": [{ "fileHash": HASH, "instanceId": "qbittorrent-host-8080" }],
        }),
    )
    .await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["type"], "error");
    assert_eq!(replies[0]["message"], "Insufficient permissions");
    assert!(harness.adapter.recorded.lock().unwrap().paused.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn non_owner_is_denied_per_item() {
    let harness = harness().await;
    // Someone else owns the item.
    let bystander = user(harness.user_id, &[Capability::PauseResume]);

    let replies = peerdeck_api::ws::handlers::dispatch(
        &harness.ctx,
        &bystander,
        json!({
            "action": "batchPause",
            "items": [{ "fileHash": HASH, "instanceId": "qbittorrent-host-8080" }],
        }),
    )
    .await;

    let complete = replies
        .iter()
        .find(|reply| reply["type"] == "batchPause-complete")
        .expect("completion reply");
    assert_eq!(complete["results"][0]["denied"], true);
    assert_eq!(complete["results"][0]["success"], false);
    assert!(harness.adapter.recorded.lock().unwrap().paused.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_on_api_managed_client_skips_disk_and_emits() {
    let harness = harness().await;
    let caller = user(
        harness.user_id,
        &[Capability::RemoveDownloads, Capability::EditAllDownloads],
    );
    let mut events = harness.ctx.events.subscribe(None);

    let replies = peerdeck_api::ws::handlers::dispatch(
        &harness.ctx,
        &caller,
        json!({
            "action": "batchDelete",
            "deleteFiles": true,
            "items": [{ "fileHash": HASH, "instanceId": "qbittorrent-host-8080" }],
        }),
    )
    .await;

    let complete = replies
        .iter()
        .find(|reply| reply["type"] == "batchDelete-complete")
        .expect("completion reply");
    assert_eq!(complete["results"][0]["success"], true);

    // The client's API removed the payload itself; the emitted event still
    // records that the files are gone from disk.
    let deleted = loop {
        let envelope = tokio::time::timeout(std::time::Duration::from_secs(2), events.next())
            .await
            .expect("event arrives")
            .expect("bus open");
        if let peerdeck_events::Event::FileDeleted {
            compound_key,
            deleted_from_disk,
        } = envelope.event
        {
            break (compound_key, deleted_from_disk);
        }
    };
    assert_eq!(deleted.0, format!("qbittorrent-host-8080:{HASH}"));
    assert!(deleted.1);
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_batches_are_rejected() {
    let harness = harness().await;
    let caller = user(harness.user_id, &[Capability::PauseResume]);
    let items: Vec<Value> = (0..1001)
        .map(|index| json!({ "fileHash": format!("{index:040x}"), "instanceId": "qbittorrent-host-8080" }))
        .collect();

    let replies = peerdeck_api::ws::handlers::dispatch(
        &harness.ctx,
        &caller,
        json!({ "action": "batchPause", "items": items }),
    )
    .await;
    assert_eq!(replies[0]["type"], "error");
}
