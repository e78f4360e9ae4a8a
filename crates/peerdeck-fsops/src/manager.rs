//! The move operation manager: queueing, the worker, and delegation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use peerdeck_categories::CategoryManager;
use peerdeck_core::{ClientRegistry, CompoundKey};
use peerdeck_data::{MoveOpRow, MoveOpStatus, MoveOpsStore};
use peerdeck_events::{Event, EventBus};

use crate::error::MoveError;
use crate::executor::{copy_with_progress, remove_source, verify_copy};

const QUEUE_CAPACITY: usize = 64;
const NATIVE_MOVE_POLLS: usize = 30;
const NATIVE_MOVE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Payload accepted by [`MoveManager::queue_move`]. The invoker has already
/// probed source and destination for accessibility.
#[derive(Debug, Clone)]
pub struct QueueMoveRequest {
    /// `instanceId:hash` of the item to move.
    pub compound_key: CompoundKey,
    /// Display name for the overlay.
    pub name: String,
    /// Source path as the owning client sees it.
    pub source_path_remote: String,
    /// Destination path as this process sees it.
    pub dest_path_local: String,
    /// Destination path as the owning client sees it.
    pub dest_path_remote: String,
    /// Total payload size in bytes.
    pub total_size: u64,
    /// Whether the payload spans multiple files.
    pub is_multi_file: bool,
    /// Category that drove the move.
    pub category_name: String,
}

/// Singleton orchestrating cross-filesystem moves.
pub struct MoveManager {
    registry: Arc<ClientRegistry>,
    categories: CategoryManager,
    store: MoveOpsStore,
    events: EventBus,
    queue: mpsc::Sender<QueueMoveRequest>,
    queue_rx: Mutex<Option<mpsc::Receiver<QueueMoveRequest>>>,
}

impl MoveManager {
    /// Build the manager; call [`MoveManager::spawn_worker`] afterwards.
    #[must_use]
    pub fn new(
        registry: Arc<ClientRegistry>,
        categories: CategoryManager,
        store: MoveOpsStore,
        events: EventBus,
    ) -> Arc<Self> {
        let (queue, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        Arc::new(Self {
            registry,
            categories,
            store,
            events,
            queue,
            queue_rx: Mutex::new(Some(queue_rx)),
        })
    }

    /// Queue a move. The request is persisted as `pending` before the call
    /// returns, so the overlay reflects it on the next tick.
    ///
    /// # Errors
    ///
    /// Fails when a move for the key is already active, or persistence
    /// fails.
    pub async fn queue_move(&self, request: QueueMoveRequest) -> Result<(), MoveError> {
        let key = request.compound_key.to_string();
        if let Some(existing) = self.store.get(&key).await.context("move lookup failed")? {
            if existing.status.is_active() {
                return Err(MoveError::AlreadyQueued(key));
            }
        }
        self.persist(&request, MoveOpStatus::Pending, 0, None, None, None, None)
            .await?;
        self.queue
            .send(request)
            .await
            .map_err(|_| MoveError::Other(anyhow!("move worker is gone")))?;
        Ok(())
    }

    /// Spawn the single worker draining the queue. Operations execute one
    /// at a time; progress and outcomes persist through the store.
    ///
    /// # Panics
    ///
    /// Panics when called twice.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut receiver = manager
                .queue_rx
                .lock()
                .await
                .take()
                .expect("spawn_worker called twice");
            while let Some(request) = receiver.recv().await {
                let key = request.compound_key.to_string();
                match manager.execute(&request).await {
                    Ok(()) => {
                        info!(key = %key, dest = %request.dest_path_remote, "move completed");
                        manager.events.publish(Event::FileMoved {
                            compound_key: key,
                            dest_path: request.dest_path_remote.clone(),
                            category: request.category_name.clone(),
                        });
                    }
                    Err(err) => {
                        warn!(key = %key, error = %err, "move failed");
                        let _ = manager
                            .persist_status(&request, MoveOpStatus::Failed, Some(err.to_string()))
                            .await;
                        manager.events.publish(Event::MoveFailed {
                            compound_key: key,
                            message: err.to_string(),
                        });
                    }
                }
            }
        })
    }

    async fn execute(&self, request: &QueueMoveRequest) -> Result<(), MoveError> {
        let instance_id = &request.compound_key.instance_id;
        let client = self
            .registry
            .get(instance_id)
            .await
            .ok_or_else(|| MoveError::InstanceUnavailable(instance_id.clone()))?;
        let flags = &client.kind.meta().flags;
        let hash = request.compound_key.hash.clone();

        self.persist_status(request, MoveOpStatus::Moving, None).await?;

        if flags.native_move {
            // Delegate and poll until the client reports the new location.
            client
                .adapter
                .update_directory(&hash, &request.dest_path_remote)
                .await
                .context("native move delegation failed")?;
            for _ in 0..NATIVE_MOVE_POLLS {
                sleep(NATIVE_MOVE_POLL_INTERVAL).await;
                let batch = client.adapter.fetch_data(&[]).await.unwrap_or_default();
                let relocated = batch
                    .downloads
                    .iter()
                    .find(|item| item.hash == hash)
                    .and_then(|item| item.torrent.as_ref())
                    .and_then(|extras| extras.save_path.as_deref())
                    .is_some_and(|path| path.starts_with(&request.dest_path_remote));
                if relocated {
                    self.persist_status(request, MoveOpStatus::Done, None).await?;
                    return Ok(());
                }
            }
            return Err(MoveError::NativeMoveTimeout(
                request.compound_key.to_string(),
            ));
        }

        if flags.pause_before_move {
            client
                .adapter
                .pause(&hash)
                .await
                .context("pre-move pause failed")?;
        }

        let source_local = self
            .categories
            .translate_path(
                &request.source_path_remote,
                client.kind.as_str(),
                instance_id,
            )
            .await;
        let result = self.copy_pass(request, &source_local).await;

        if flags.pause_before_move {
            if let Err(err) = client.adapter.resume(&hash).await {
                warn!(key = %request.compound_key, error = %err, "post-move resume failed");
            }
        }
        result?;

        // Point the client at the new location.
        if let Err(err) = client
            .adapter
            .update_directory(&hash, &request.dest_path_remote)
            .await
        {
            warn!(key = %request.compound_key, error = %err, "client repoint failed");
        }

        self.persist_status(request, MoveOpStatus::Done, None).await?;
        Ok(())
    }

    async fn copy_pass(
        &self,
        request: &QueueMoveRequest,
        source_local: &str,
    ) -> Result<(), MoveError> {
        let source = Path::new(source_local);
        let dest = Path::new(&request.dest_path_local);

        // Progress rows flow through a channel so the copy never waits on
        // the database; the drain settles before the status moves on.
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<MoveOpRow>();
        let store = self.store.clone();
        let drain = tokio::spawn(async move {
            while let Some(row) = progress_rx.recv().await {
                let _ = store.upsert(&row).await;
            }
        });

        let row_template = self.row(request, MoveOpStatus::Moving, 0, None, None, None, None);
        let copy_result = copy_with_progress(source, dest, move |progress| {
            let mut row = row_template.clone();
            row.bytes_moved = progress.bytes_moved.min(i64::MAX as u64) as i64;
            row.files_total = Some(progress.files_total.min(i64::MAX as u64) as i64);
            row.files_moved = Some(progress.files_moved.min(i64::MAX as u64) as i64);
            row.current_file = progress.current_file.clone();
            row.updated_at = Utc::now();
            let _ = progress_tx.send(row);
        })
        .await;
        let _ = drain.await;
        let copied = copy_result?;

        self.persist_status(request, MoveOpStatus::Verifying, None).await?;
        verify_copy(dest, copied).await?;
        remove_source(source).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn row(
        &self,
        request: &QueueMoveRequest,
        status: MoveOpStatus,
        bytes_moved: i64,
        files_total: Option<i64>,
        files_moved: Option<i64>,
        current_file: Option<String>,
        error_message: Option<String>,
    ) -> MoveOpRow {
        MoveOpRow {
            compound_key: request.compound_key.to_string(),
            name: request.name.clone(),
            client_type: request
                .compound_key
                .instance_id
                .split('-')
                .next()
                .unwrap_or("")
                .to_string(),
            source_path_remote: request.source_path_remote.clone(),
            dest_path_local: request.dest_path_local.clone(),
            dest_path_remote: request.dest_path_remote.clone(),
            total_size: request.total_size.min(i64::MAX as u64) as i64,
            bytes_moved,
            files_total,
            files_moved,
            current_file,
            is_multi_file: request.is_multi_file,
            status,
            error_message,
            category_name: request.category_name.clone(),
            updated_at: Utc::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        request: &QueueMoveRequest,
        status: MoveOpStatus,
        bytes_moved: i64,
        files_total: Option<i64>,
        files_moved: Option<i64>,
        current_file: Option<String>,
        error_message: Option<String>,
    ) -> Result<(), MoveError> {
        self.store
            .upsert(&self.row(
                request,
                status,
                bytes_moved,
                files_total,
                files_moved,
                current_file,
                error_message,
            ))
            .await
            .context("move persistence failed")?;
        Ok(())
    }

    async fn persist_status(
        &self,
        request: &QueueMoveRequest,
        status: MoveOpStatus,
        error_message: Option<String>,
    ) -> Result<(), MoveError> {
        let existing = self
            .store
            .get(&request.compound_key.to_string())
            .await
            .context("move lookup failed")?;
        let bytes = existing.as_ref().map_or(0, |row| row.bytes_moved);
        let files_total = existing.as_ref().and_then(|row| row.files_total);
        let files_moved = existing.as_ref().and_then(|row| row.files_moved);
        self.persist(
            request,
            status,
            bytes,
            files_total,
            files_moved,
            None,
            error_message,
        )
        .await
    }

    /// Drop the finished/failed record for a key (called after the UI
    /// acknowledged the outcome).
    ///
    /// # Errors
    ///
    /// Fails on store failure.
    pub async fn clear(&self, compound_key: &str) -> Result<(), MoveError> {
        self.store
            .remove(compound_key)
            .await
            .context("move removal failed")?;
        Ok(())
    }

    /// Resolve the destination pair for an item's category through the
    /// category manager (documented same-filesystem constraint for
    /// native-move clients applies).
    pub async fn resolve_dest_paths(
        &self,
        category_name: &str,
        instance_id: &str,
        kind_label: &str,
        native_move: bool,
    ) -> Option<peerdeck_categories::DestPaths> {
        self.categories
            .resolve_dest_paths(category_name, instance_id, kind_label, native_move)
            .await
    }
}
