//! Bridge from the event bus to an external scripting sink.
//!
//! The sink is an interface contract: the concrete implementation (spawning
//! user scripts, webhooks, …) lives outside the core. The bridge forwards
//! every published event; sink failures are logged and never interrupt the
//! bus.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{EventBus, EventEnvelope};

/// Receiver for domain events, implemented by the scripting integration.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Errors are logged by the bridge and not retried.
    async fn deliver(&self, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

/// Spawn the background task that forwards bus events to a sink.
pub fn spawn_sink_bridge(bus: &EventBus, sink: Arc<dyn EventSink>) -> JoinHandle<()> {
    let mut stream = bus.subscribe(None);
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            if let Err(err) = sink.deliver(&envelope).await {
                warn!(
                    error = %err,
                    event = envelope.event.kind(),
                    "event sink delivery failed"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;
    use std::sync::Mutex;
    use tokio::time::{Duration, sleep};

    struct RecordingSink {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn deliver(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(envelope.event.kind().to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn bridge_forwards_published_events() {
        let bus = EventBus::with_capacity(8);
        let sink = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let handle = spawn_sink_bridge(&bus, sink.clone());

        let _ = bus.publish(Event::CategoryCreated {
            name: "Movies".to_string(),
        });
        let _ = bus.publish(Event::ClientConnected {
            instance_id: "amule-host-4712".to_string(),
        });

        sleep(Duration::from_millis(50)).await;
        let seen = sink.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["categoryCreated", "clientConnected"]);
        handle.abort();
    }
}
