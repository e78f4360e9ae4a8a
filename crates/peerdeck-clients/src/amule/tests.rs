//! Adapter behaviour against an in-memory EC transport.

use super::*;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::time::{sleep, Duration};

#[derive(Default)]
struct FakeState {
    downloads: Vec<EcDownload>,
    shared: Vec<EcSharedFile>,
    uploads: Vec<EcUpload>,
    categories: Vec<EcCategory>,
}

#[derive(Default)]
struct FakeTransport {
    state: Mutex<FakeState>,
    fail_fetch: AtomicBool,
    slow_connect: AtomicBool,
    next_category_id: AtomicU32,
}

impl FakeTransport {
    fn new() -> Arc<Self> {
        let transport = Self::default();
        transport.next_category_id.store(1, Ordering::SeqCst);
        Arc::new(transport)
    }
}

#[async_trait]
impl EcTransport for FakeTransport {
    async fn connect(&self, _password: &str) -> anyhow::Result<()> {
        if self.slow_connect.load(Ordering::SeqCst) {
            sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    async fn version(&self) -> anyhow::Result<String> {
        Ok("aMule 2.3.3".to_string())
    }

    async fn close(&self) {}

    async fn download_queue(&self) -> anyhow::Result<Vec<EcDownload>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            anyhow::bail!("socket reset");
        }
        Ok(self.state.lock().await.downloads.clone())
    }

    async fn shared_files(&self) -> anyhow::Result<Vec<EcSharedFile>> {
        Ok(self.state.lock().await.shared.clone())
    }

    async fn upload_queue(&self) -> anyhow::Result<Vec<EcUpload>> {
        Ok(self.state.lock().await.uploads.clone())
    }

    async fn stats(&self) -> anyhow::Result<Value> {
        Ok(stats_object(100, 200, 1_000, 2_000, true, true))
    }

    async fn pause_file(&self, _hash: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn resume_file(&self, _hash: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop_file(&self, _hash: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cancel_file(&self, _hash: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn add_link(&self, _link: &str, _category_id: Option<u32>) -> anyhow::Result<String> {
        Ok("0123456789abcdef0123456789abcdef".to_string())
    }

    async fn download_search_result(
        &self,
        _hash: &str,
        _category_id: Option<u32>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_file_category(&self, _hash: &str, _category_id: u32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn categories(&self) -> anyhow::Result<Vec<EcCategory>> {
        Ok(self.state.lock().await.categories.clone())
    }

    async fn create_category(&self, category: &EcCategory) -> anyhow::Result<u32> {
        let id = self.next_category_id.fetch_add(1, Ordering::SeqCst);
        self.state.lock().await.categories.push(EcCategory {
            id,
            ..category.clone()
        });
        Ok(id)
    }

    async fn update_category(&self, category: &EcCategory) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .categories
            .iter_mut()
            .find(|existing| existing.id == category.id)
        {
            *existing = category.clone();
        }
        Ok(())
    }

    async fn delete_category(&self, id: u32) -> anyhow::Result<()> {
        self.state
            .lock()
            .await
            .categories
            .retain(|category| category.id != id);
        Ok(())
    }

    async fn refresh_shared(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn search(
        &self,
        _query: &str,
        _file_type: Option<&str>,
        _min_size: Option<u64>,
        _max_size: Option<u64>,
    ) -> anyhow::Result<Vec<EcSearchHit>> {
        Ok(vec![EcSearchHit {
            hash: "ABCDEF0123456789ABCDEF0123456789".to_string(),
            name: "hit.bin".to_string(),
            size: 42,
            sources: 5,
            complete_sources: 2,
        }])
    }

    async fn log(&self) -> anyhow::Result<String> {
        Ok("log line".to_string())
    }

    async fn preferences(&self) -> anyhow::Result<EcPreferences> {
        Ok(EcPreferences {
            incoming_dir: Some("/srv/downloads".to_string()),
        })
    }

    async fn servers(&self) -> anyhow::Result<Vec<ServerInfo>> {
        Ok(Vec::new())
    }

    async fn server_action(&self, _action: &str, _address: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn adapter_with(transport: Arc<FakeTransport>) -> Arc<AmuleAdapter> {
    AmuleAdapter::new(
        "amule-host-4712",
        "mule",
        true,
        "secret",
        transport,
        EventBus::with_capacity(16),
    )
}

fn sample_download() -> EcDownload {
    EcDownload {
        hash: "ABCDEF0123456789ABCDEF0123456789".to_string(),
        name: "Film.iso".to_string(),
        size_full: 1_000,
        size_done: 250,
        speed: 50,
        status_code: 0,
        priority: 0,
        category_id: 0,
        source_count: 12,
        source_count_xfer: 3,
        source_count_not_current: 2,
        source_count_a4af: 1,
        ed2k_link: Some("ed2k://|file|Film.iso|1000|ABCDEF|/".to_string()),
        part_status: None,
    }
}

#[tokio::test]
async fn concurrent_connect_observes_guard() {
    let transport = FakeTransport::new();
    transport.slow_connect.store(true, Ordering::SeqCst);
    let adapter = adapter_with(transport);

    let first = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.init_client().await.unwrap() })
    };
    sleep(Duration::from_millis(10)).await;
    let second = adapter.init_client().await.unwrap();
    assert!(!second, "second caller must return early");
    assert!(first.await.unwrap());
    assert!(adapter.is_connected());
}

#[tokio::test]
async fn fetch_normalizes_downloads_shared_and_uploads() {
    let transport = FakeTransport::new();
    {
        let mut state = transport.state.lock().await;
        state.downloads.push(sample_download());
        state.shared.push(EcSharedFile {
            hash: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF".to_string(),
            name: "done.bin".to_string(),
            size: 500,
            path: Some("/srv/downloads/done.bin".to_string()),
            upload_total: 9_000,
            accepted_requests: 4,
            ed2k_link: None,
        });
        state.uploads.push(EcUpload {
            peer_address: "198.51.100.7".to_string(),
            peer_port: 4662,
            client_software: Some("eMule".to_string()),
            file_hash: Some("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF".to_string()),
            speed: 77,
            transferred: 1_234,
        });
    }
    let adapter = adapter_with(transport);
    adapter.init_client().await.unwrap();

    let batch = adapter.fetch_data(&[]).await.unwrap();
    assert_eq!(batch.downloads.len(), 1);
    let download = &batch.downloads[0];
    assert_eq!(download.hash, "abcdef0123456789abcdef0123456789");
    assert_eq!(download.instance_id, "amule-host-4712");
    assert!((download.progress - 0.25).abs() < 1e-9);
    assert_eq!(download.status, ItemStatus::Active);
    assert!(download.downloading);
    assert!(!download.complete);
    assert_eq!(download.sources.a4af, Some(1));
    assert_eq!(download.eta, Some(15));

    let shared = &batch.shared_files[0];
    assert!(shared.complete && shared.seeding && shared.shared);
    assert!((shared.progress - 1.0).abs() < f64::EPSILON);

    let upload = &batch.uploads[0];
    assert_eq!(upload.peer.upload_rate, 77);
    assert_eq!(upload.hash.as_deref(), Some("ffffffffffffffffffffffffffffffff"));
}

#[tokio::test]
async fn transport_failure_returns_cached_batch_and_disconnects() {
    let transport = FakeTransport::new();
    transport.state.lock().await.downloads.push(sample_download());
    let adapter = adapter_with(transport.clone());
    adapter.init_client().await.unwrap();

    let first = adapter.fetch_data(&[]).await.unwrap();
    assert_eq!(first.downloads.len(), 1);

    transport.fail_fetch.store(true, Ordering::SeqCst);
    let cached = adapter.fetch_data(&[]).await.unwrap();
    assert_eq!(cached.downloads.len(), 1, "cached batch is returned");
    assert!(!adapter.is_connected(), "transport failure marks disconnected");
}

#[tokio::test]
async fn shared_delete_returns_disk_path() {
    let transport = FakeTransport::new();
    transport.state.lock().await.shared.push(EcSharedFile {
        hash: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF".to_string(),
        name: "done.bin".to_string(),
        size: 500,
        path: Some("/srv/downloads/done.bin".to_string()),
        upload_total: 0,
        accepted_requests: 0,
        ed2k_link: None,
    });
    let adapter = adapter_with(transport);
    adapter.init_client().await.unwrap();
    let _ = adapter.fetch_data(&[]).await.unwrap();

    let outcome = adapter
        .delete_item(
            "ffffffffffffffffffffffffffffffff",
            &DeleteRequest {
                delete_files: true,
                is_shared: true,
                file_path: None,
            },
        )
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.paths_to_delete, vec!["/srv/downloads/done.bin"]);

    let download_outcome = adapter
        .delete_item("abc", &DeleteRequest::default())
        .await
        .unwrap();
    assert!(download_outcome.paths_to_delete.is_empty());
}

#[tokio::test]
async fn ensure_category_creates_and_reports_native_id() {
    let transport = FakeTransport::new();
    let adapter = adapter_with(transport.clone());
    adapter.init_client().await.unwrap();

    let outcome = adapter
        .ensure_category_exists(&CategorySpec {
            name: "Movies".to_string(),
            path: Some("/srv/movies".to_string()),
            comment: String::new(),
            color: "#ff0000".to_string(),
            priority: Some(UnifiedPriority::High),
        })
        .await
        .unwrap();
    let id = outcome.amule_id.unwrap();
    assert!(id > 0);

    // Second ensure reuses the same native id.
    let again = adapter
        .ensure_amule_category_id("Movies")
        .await
        .unwrap();
    assert_eq!(again, id);

    let natives = adapter.native_categories().await.unwrap();
    let movies = natives.iter().find(|spec| spec.name == "Movies").unwrap();
    assert_eq!(movies.color, "#ff0000");
    assert_eq!(movies.priority, Some(UnifiedPriority::High));
}

#[tokio::test]
async fn network_status_reads_stats_shape() {
    let transport = FakeTransport::new();
    let adapter = adapter_with(transport);
    let raw = adapter.get_stats().await.unwrap();

    let metrics = adapter.extract_metrics(&raw);
    assert_eq!(metrics.upload_speed, 100);
    assert_eq!(metrics.download_total, 2_000);

    let status = adapter.network_status(&raw);
    assert_eq!(status.status, NetworkHealth::Green);
    assert!(status.port_open);
    assert_eq!(status.listen_port, Some(4662));
}
