#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Domain event bus for the control plane.
//!
//! The bus provides a typed event enum, sequential identifiers, and a bounded
//! replay ring so late subscribers can catch up. Internally it uses
//! `tokio::broadcast`; when the channel overflows, the oldest events are
//! dropped. The [`hook`] module bridges the bus to an external scripting
//! sink.

pub mod hook;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;

pub use hook::{EventSink, spawn_sink_bridge};

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the system and to the scripting hook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    /// A download was admitted on a client instance.
    DownloadAdded {
        /// `instanceId:hash` of the new item.
        compound_key: String,
        /// Display name, when already known.
        name: Option<String>,
        /// User who added it, when authenticated.
        user_id: Option<i64>,
    },
    /// A download disappeared from a client instance.
    DownloadRemoved {
        /// `instanceId:hash` of the removed item.
        compound_key: String,
    },
    /// A download finished.
    DownloadCompleted {
        /// `instanceId:hash` of the completed item.
        compound_key: String,
        /// Display name.
        name: String,
    },
    /// A move operation finished successfully.
    FileMoved {
        /// `instanceId:hash` of the moved item.
        compound_key: String,
        /// Destination directory.
        dest_path: String,
        /// Category that drove the move.
        category: String,
    },
    /// A move operation failed.
    MoveFailed {
        /// `instanceId:hash` of the item.
        compound_key: String,
        /// Failure detail.
        message: String,
    },
    /// An item (and possibly its payload) was deleted.
    FileDeleted {
        /// `instanceId:hash` of the deleted item.
        compound_key: String,
        /// Whether payload files were removed from disk.
        deleted_from_disk: bool,
    },
    /// A category was created.
    CategoryCreated {
        /// Category name.
        name: String,
    },
    /// A category was updated.
    CategoryUpdated {
        /// Category name.
        name: String,
    },
    /// A category was deleted.
    CategoryDeleted {
        /// Category name.
        name: String,
    },
    /// A client instance established its connection.
    ClientConnected {
        /// Instance id.
        instance_id: String,
    },
    /// A client instance lost its connection.
    ClientDisconnected {
        /// Instance id.
        instance_id: String,
        /// Transport detail, when available.
        reason: Option<String>,
    },
    /// A user authenticated successfully.
    UserLoggedIn {
        /// User name.
        username: String,
        /// Source address of the login.
        remote_addr: String,
    },
}

impl Event {
    /// Machine-friendly discriminator for sinks and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DownloadAdded { .. } => "downloadAdded",
            Self::DownloadRemoved { .. } => "downloadRemoved",
            Self::DownloadCompleted { .. } => "downloadCompleted",
            Self::FileMoved { .. } => "fileMoved",
            Self::MoveFailed { .. } => "moveFailed",
            Self::FileDeleted { .. } => "fileDeleted",
            Self::CategoryCreated { .. } => "categoryCreated",
            Self::CategoryUpdated { .. } => "categoryUpdated",
            Self::CategoryDeleted { .. } => "categoryDeleted",
            Self::ClientConnected { .. } => "clientConnected",
            Self::ClientDisconnected { .. } => "clientDisconnected",
            Self::UserLoggedIn { .. } => "userLoggedIn",
        }
    }
}

/// Metadata wrapper around events: id plus emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// When the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default replay buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper yielding events from the replay backlog, then live.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(n: usize) -> Event {
        Event::DownloadAdded {
            compound_key: format!("amule-host-4712:{n:032x}"),
            name: Some(format!("file-{n}")),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn replay_ring_drops_oldest() {
        let bus = EventBus::with_capacity(2);
        for i in 0..4 {
            let _ = bus.publish(sample_event(i));
        }
        let mut stream = bus.subscribe(Some(0));
        let first = stream.next().await.unwrap();
        assert_eq!(first.id, 3, "events 1 and 2 fell out of the ring");
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(sample_event(0).kind(), "downloadAdded");
        assert_eq!(
            Event::FileMoved {
                compound_key: "a:b".to_string(),
                dest_path: "/data".to_string(),
                category: "Movies".to_string(),
            }
            .kind(),
            "fileMoved"
        );
    }

    #[test]
    fn last_event_id_reflects_recent_publish() {
        let bus = EventBus::with_capacity(2);
        assert!(bus.last_event_id().is_none());
        let id = bus.publish(sample_event(0));
        assert_eq!(bus.last_event_id(), Some(id));
    }
}
