//! Event scripting sink: forwards domain events to an external command.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use peerdeck_events::{EventEnvelope, EventSink};

/// Sink that invokes a configured script with the event kind as its first
/// argument and the JSON envelope on the second.
pub struct ScriptEventSink {
    script_path: String,
}

impl ScriptEventSink {
    /// Sink for the configured script path.
    #[must_use]
    pub fn new(script_path: String) -> Self {
        Self { script_path }
    }
}

#[async_trait]
impl EventSink for ScriptEventSink {
    async fn deliver(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let payload = serde_json::to_string(envelope)?;
        debug!(event = envelope.event.kind(), script = %self.script_path, "firing event script");
        let status = Command::new(&self.script_path)
            .arg(envelope.event.kind())
            .arg(&payload)
            .status()
            .await?;
        if !status.success() {
            anyhow::bail!("event script exited with {status}");
        }
        Ok(())
    }
}
