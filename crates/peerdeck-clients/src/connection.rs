//! Shared connection state and the per-adapter reconnect loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use peerdeck_core::ClientAdapter;
use peerdeck_events::{Event, EventBus};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// How long a disconnected adapter waits before the next connect attempt.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection flags shared by every adapter implementation.
///
/// `begin_connect` implements the connect-in-progress guard: the first
/// caller wins, concurrent callers observe the in-progress state and return
/// early.
#[derive(Debug)]
pub struct ConnectionFlags {
    enabled: AtomicBool,
    connected: AtomicBool,
    connect_in_progress: AtomicBool,
}

impl ConnectionFlags {
    /// Fresh flags for an adapter.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            connected: AtomicBool::new(false),
            connect_in_progress: AtomicBool::new(false),
        }
    }

    /// Whether the instance is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether a live connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Try to claim the connect slot; `false` means a connect is already in
    /// flight and the caller should return early.
    #[must_use]
    pub fn begin_connect(&self) -> bool {
        self.connect_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the connect slot and record the outcome.
    pub fn finish_connect(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        self.connect_in_progress.store(false, Ordering::SeqCst);
    }

    /// Mark the connection lost (transport failure path).
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Disable the instance, dropping the connection.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Spawn the background loop that reconnects an enabled-but-disconnected
/// adapter every [`RECONNECT_INTERVAL`]. Connect/disconnect transitions are
/// published to the event bus.
pub fn spawn_reconnect_loop(
    adapter: Arc<dyn ClientAdapter>,
    events: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_connected = adapter.is_connected();
        loop {
            sleep(RECONNECT_INTERVAL).await;
            if !adapter.is_enabled() {
                continue;
            }
            let connected = adapter.is_connected();
            if connected != was_connected && !connected {
                events.publish(Event::ClientDisconnected {
                    instance_id: adapter.identity().instance_id,
                    reason: None,
                });
            }
            was_connected = connected;
            if connected {
                continue;
            }
            let identity = adapter.identity();
            debug!(instance = %identity.instance_id, "attempting reconnect");
            match adapter.init_client().await {
                Ok(true) => {
                    info!(instance = %identity.instance_id, "reconnected");
                    events.publish(Event::ClientConnected {
                        instance_id: identity.instance_id,
                    });
                    was_connected = true;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        instance = %identity.instance_id,
                        error = %err,
                        "reconnect attempt failed"
                    );
                }
            }
        }
    })
}
