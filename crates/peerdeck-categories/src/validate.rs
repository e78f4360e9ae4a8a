//! Debounced validation of every configured category path.
//!
//! Adapters finishing their connect-time sync tend to request validation
//! near-simultaneously; invocations within a 500 ms window coalesce into a
//! single pass whose result every pending caller receives.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

/// Debounce window for coalescing validation requests.
pub(crate) const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Validation result for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PathStatus {
    /// The probe ran; the three flags describe the directory.
    Checked {
        /// Whether the path exists.
        exists: bool,
        /// Whether the path could be read.
        readable: bool,
        /// Whether the path could be written.
        writable: bool,
    },
    /// The probe itself failed.
    Error(String),
}

impl PathStatus {
    /// Whether the path is fully usable as a move destination.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            Self::Checked {
                exists: true,
                readable: true,
                writable: true
            }
        )
    }
}

/// Map from `category-name → (path → status)`.
pub type ValidationReport = HashMap<String, HashMap<String, PathStatus>>;

/// Filesystem probe used by validation; injectable so tests avoid the disk.
#[async_trait]
pub trait PathValidator: Send + Sync {
    /// Probe one directory.
    async fn probe(&self, path: &str) -> PathStatus;
}

/// The real probe: blocking filesystem checks on the worker pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPathValidator;

#[async_trait]
impl PathValidator for FsPathValidator {
    async fn probe(&self, path: &str) -> PathStatus {
        let path = path.to_string();
        let result = tokio::task::spawn_blocking(move || probe_blocking(Path::new(&path))).await;
        match result {
            Ok(status) => status,
            Err(err) => PathStatus::Error(format!("probe task failed: {err}")),
        }
    }
}

fn probe_blocking(path: &Path) -> PathStatus {
    let exists = path.exists();
    if !exists {
        return PathStatus::Checked {
            exists: false,
            readable: false,
            writable: false,
        };
    }
    let readable = std::fs::read_dir(path).is_ok();
    let writable = probe_writable(path);
    PathStatus::Checked {
        exists,
        readable,
        writable,
    }
}

fn probe_writable(path: &Path) -> bool {
    let marker = path.join(".peerdeck-write-probe");
    match std::fs::File::create(&marker) {
        Ok(_) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}

struct PendingPass {
    deadline: Arc<Mutex<Instant>>,
    receiver: watch::Receiver<Option<Arc<ValidationReport>>>,
}

/// Coalesces concurrent validation requests into single passes.
pub(crate) struct Debouncer {
    pending: Mutex<Option<PendingPass>>,
}

impl Debouncer {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    /// Join (or start) the current debounced pass. `run_pass` executes once
    /// per window no matter how many callers arrive.
    pub(crate) async fn run<F, Fut>(&self, run_pass: F) -> Arc<ValidationReport>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ValidationReport> + Send + 'static,
    {
        let mut receiver = {
            let mut pending = self.pending.lock().await;
            if let Some(pass) = pending.as_ref() {
                debug!("validation already pending; extending debounce window");
                *pass.deadline.lock().await = Instant::now() + DEBOUNCE_WINDOW;
                pass.receiver.clone()
            } else {
                let deadline = Arc::new(Mutex::new(Instant::now() + DEBOUNCE_WINDOW));
                let (sender, receiver) = watch::channel(None);
                *pending = Some(PendingPass {
                    deadline: deadline.clone(),
                    receiver: receiver.clone(),
                });
                tokio::spawn(async move {
                    loop {
                        let target = *deadline.lock().await;
                        if Instant::now() >= target {
                            break;
                        }
                        sleep_until(target).await;
                    }
                    let report = Arc::new(run_pass().await);
                    let _ = sender.send(Some(report));
                });
                receiver
            }
        };

        loop {
            let current = receiver.borrow().clone();
            if let Some(report) = current {
                self.clear_if_done().await;
                return report;
            }
            if receiver.changed().await.is_err() {
                return Arc::new(ValidationReport::default());
            }
        }
    }

    async fn clear_if_done(&self) {
        let mut pending = self.pending.lock().await;
        let done = pending
            .as_ref()
            .is_some_and(|pass| pass.receiver.borrow().is_some());
        if done {
            *pending = None;
        }
    }
}
