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

//! Persistence layer: one small SQLite database per concern.
//!
//! Every pool runs with write-ahead logging and foreign keys enforced, and
//! multi-statement mutations run inside explicit transactions.

pub mod error;
pub mod hashes;
pub mod history;
pub mod metrics;
pub mod moves;
pub mod ownership;
pub mod sessions;
pub mod sqlite;
pub mod users;

use std::path::Path;

use anyhow::{Context, Result};

pub use error::DataError;
pub use hashes::HashStore;
pub use history::{HistoryEntry, HistoryStore};
pub use metrics::{MetricsSample, MetricsStore};
pub use moves::{MoveOpRow, MoveOpStatus, MoveOpsStore};
pub use ownership::OwnershipStore;
pub use sessions::{SessionRow, SessionStore};
pub use sqlite::{open_memory_pool, open_pool};
pub use users::{NewUser, UserRecord, UserStore, UserUpdate};

/// All per-concern stores opened against the data directory.
#[derive(Clone)]
pub struct DataStores {
    /// Users, capabilities, and API keys (`users.db`).
    pub users: UserStore,
    /// Ownership records, co-located with users (`users.db`).
    pub ownership: OwnershipStore,
    /// Session rows (`sessions.db`).
    pub sessions: SessionStore,
    /// Download history (`history.db`).
    pub history: HistoryStore,
    /// Move operations (`move_ops.db`).
    pub moves: MoveOpsStore,
    /// Transfer telemetry samples (`metrics.db`).
    pub metrics: MetricsStore,
    /// Synthetic torrent-hash bi-map (`hashes.db`).
    pub hashes: HashStore,
}

impl DataStores {
    /// Open every store under `data_dir`, creating schemas as needed.
    ///
    /// # Errors
    ///
    /// Fails when a database cannot be opened or its schema cannot be
    /// created.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let users_pool = open_pool(&data_dir.join("users.db")).await?;
        let users = UserStore::new(users_pool.clone()).await?;
        let ownership = OwnershipStore::new(users_pool).await?;
        let sessions = SessionStore::new(open_pool(&data_dir.join("sessions.db")).await?).await?;
        let history = HistoryStore::new(open_pool(&data_dir.join("history.db")).await?).await?;
        let moves = MoveOpsStore::new(open_pool(&data_dir.join("move_ops.db")).await?).await?;
        let metrics = MetricsStore::new(open_pool(&data_dir.join("metrics.db")).await?).await?;
        let hashes = HashStore::new(open_pool(&data_dir.join("hashes.db")).await?).await?;

        Ok(Self {
            users,
            ownership,
            sessions,
            history,
            moves,
            metrics,
            hashes,
        })
    }
}
