//! The data fetch service: tick execution, batch cache, and fan-out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};

use peerdeck_categories::CategoryManager;
use peerdeck_core::{ClientRegistry, FetchBatch, ItemStatus, UnifiedItem};
use peerdeck_data::{HistoryStore, MoveOpsStore, OwnershipStore};
use peerdeck_events::{Event, EventBus};

use crate::assemble::assemble_items;
use crate::enrich::{backfill_added_at, enrich_peers, GeoIpResolver, HostResolver};

const BROADCAST_CAPACITY: usize = 16;

/// One assembled, enriched batch with its generation timestamp.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    /// The unified item list.
    pub items: Vec<UnifiedItem>,
    /// When the batch was assembled.
    pub generated_at: DateTime<Utc>,
}

impl BatchSnapshot {
    /// Age of the snapshot.
    #[must_use]
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.generated_at
    }
}

/// Constructor dependencies for [`DataFetchService`].
pub struct PipelineDeps {
    /// Client registry supplying connected adapters.
    pub registry: Arc<ClientRegistry>,
    /// Category manager supplying per-client category hints.
    pub categories: CategoryManager,
    /// History store for added-at backfill and recording.
    pub history: HistoryStore,
    /// Move operations store for the status overlay.
    pub moves: MoveOpsStore,
    /// Ownership store swept for orphans after deletes.
    pub ownership: OwnershipStore,
    /// GeoIP resolver.
    pub geoip: Arc<dyn GeoIpResolver>,
    /// Reverse-DNS resolver.
    pub hosts: Arc<dyn HostResolver>,
    /// Event bus for completion events.
    pub events: EventBus,
    /// Whether history recording is enabled.
    pub history_enabled: bool,
}

/// Singleton owning the pipeline tick and the batch cache.
pub struct DataFetchService {
    deps: PipelineDeps,
    cache: RwLock<Option<Arc<BatchSnapshot>>>,
    tick_guard: Mutex<()>,
    broadcasts: broadcast::Sender<Arc<BatchSnapshot>>,
}

impl DataFetchService {
    /// Build the service.
    #[must_use]
    pub fn new(deps: PipelineDeps) -> Arc<Self> {
        let (broadcasts, _) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(Self {
            deps,
            cache: RwLock::new(None),
            tick_guard: Mutex::new(()),
            broadcasts,
        })
    }

    /// Subscribe to assembled batches for fan-out.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BatchSnapshot>> {
        self.broadcasts.subscribe()
    }

    /// The cached batch when it is younger than `max_age_ms`.
    pub async fn cached_batch(&self, max_age_ms: i64) -> Option<Arc<BatchSnapshot>> {
        let cached = self.cache.read().await.clone()?;
        (cached.age().num_milliseconds() <= max_age_ms).then_some(cached)
    }

    /// The cached batch regardless of age.
    pub async fn latest_batch(&self) -> Option<Arc<BatchSnapshot>> {
        self.cache.read().await.clone()
    }

    /// Run one full pipeline tick. Ticks serialize on an internal guard;
    /// the cached-batch replacement is atomic.
    ///
    /// # Errors
    ///
    /// Never fails for per-instance fetch errors; only unexpected internal
    /// failures propagate.
    pub async fn run_tick(&self) -> anyhow::Result<Arc<BatchSnapshot>> {
        let _guard = self.tick_guard.lock().await;

        let connected = self.deps.registry.get_connected().await;
        let fetches = connected.into_iter().map(|(instance_id, client)| {
            let categories = self.deps.categories.clone();
            async move {
                let hint = categories
                    .specs_for(&instance_id, client.kind.as_str())
                    .await;
                match client.adapter.fetch_data(&hint).await {
                    Ok(batch) => Some(batch),
                    Err(err) => {
                        // Adapters absorb transport failures; anything that
                        // still surfaces is logged and the instance skipped.
                        warn!(instance = %instance_id, error = %err, "fetch_data failed");
                        None
                    }
                }
            }
        });
        let batches: Vec<FetchBatch> = join_all(fetches).await.into_iter().flatten().collect();

        let mut items = assemble_items(batches);
        enrich_peers(&mut items, self.deps.geoip.as_ref(), self.deps.hosts.as_ref()).await;
        backfill_added_at(&mut items, &self.deps.history).await;
        self.apply_move_overlay(&mut items).await;
        if self.deps.history_enabled {
            self.record_history(&items).await;
        }

        let snapshot = Arc::new(BatchSnapshot {
            items,
            generated_at: Utc::now(),
        });
        let previous = {
            let mut cache = self.cache.write().await;
            cache.replace(snapshot.clone())
        };
        self.publish_diff_events(previous.as_deref(), &snapshot);
        let _ = self.broadcasts.send(snapshot.clone());
        debug!(items = snapshot.items.len(), "pipeline tick complete");
        Ok(snapshot)
    }

    fn publish_diff_events(&self, previous: Option<&BatchSnapshot>, current: &BatchSnapshot) {
        let Some(previous) = previous else {
            return;
        };
        let previous_keys: std::collections::HashMap<String, bool> = previous
            .items
            .iter()
            .map(|item| (item.key().to_string(), item.complete))
            .collect();
        let current_keys: std::collections::HashSet<String> = current
            .items
            .iter()
            .map(|item| item.key().to_string())
            .collect();

        for item in &current.items {
            let key = item.key().to_string();
            match previous_keys.get(&key) {
                None => {
                    self.deps.events.publish(Event::DownloadAdded {
                        compound_key: key,
                        name: Some(item.name.clone()),
                        user_id: None,
                    });
                }
                Some(was_complete) if !was_complete && item.complete => {
                    self.deps.events.publish(Event::DownloadCompleted {
                        compound_key: key,
                        name: item.name.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        for key in previous_keys.keys() {
            if !current_keys.contains(key) {
                self.deps.events.publish(Event::DownloadRemoved {
                    compound_key: key.clone(),
                });
            }
        }
    }

    /// Trigger an out-of-band refresh after a mutation; errors are logged.
    pub async fn refresh_and_broadcast(&self) {
        if let Err(err) = self.run_tick().await {
            warn!(error = %err, "post-mutation refresh failed");
        }
    }

    async fn apply_move_overlay(&self, items: &mut [UnifiedItem]) {
        let active = match self.deps.moves.load_active().await {
            Ok(active) => active,
            Err(err) => {
                warn!(error = %err, "move overlay load failed");
                return;
            }
        };
        if active.is_empty() {
            return;
        }
        for item in items.iter_mut() {
            let key = item.key().to_string();
            if let Some(op) = active.iter().find(|op| op.compound_key == key) {
                item.status = ItemStatus::Moving;
                item.move_status = Some(op.status.as_str().to_string());
                item.move_progress = Some(if op.total_size <= 0 {
                    0.0
                } else {
                    op.bytes_moved as f64 / op.total_size as f64
                });
                item.move_files_total = op.files_total.map(|n| n.max(0) as u64);
                item.move_files_moved = op.files_moved.map(|n| n.max(0) as u64);
                item.move_current_file = op.current_file.clone();
            }
        }
    }

    async fn record_history(&self, items: &[UnifiedItem]) {
        for item in items {
            let key = item.key().to_string();
            let owner = match self.deps.ownership.owner_of(&key).await {
                Ok(owner) => owner,
                Err(_) => None,
            };
            if let Err(err) = self
                .deps
                .history
                .record_added(&key, &item.name, item.size.min(i64::MAX as u64) as i64, owner)
                .await
            {
                warn!(error = %err, "history record failed");
                continue;
            }
            if item.complete {
                if let Err(err) = self.deps.history.record_completed(&key).await {
                    warn!(error = %err, "history completion record failed");
                }
            }
        }
    }

    /// Sweep ownership records whose items no longer exist anywhere.
    pub async fn sweep_orphaned_ownership(&self) {
        let Some(snapshot) = self.latest_batch().await else {
            return;
        };
        let live: std::collections::HashSet<String> = snapshot
            .items
            .iter()
            .map(|item| item.key().to_string())
            .collect();
        match self.deps.ownership.retain_keys(&live).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "swept orphaned ownership records"),
            Err(err) => warn!(error = %err, "ownership sweep failed"),
        }
    }
}
