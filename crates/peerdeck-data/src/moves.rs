//! Move operation rows (`move_ops.db`).
//!
//! The move manager keeps its live queue in memory; this store persists the
//! rows so interrupted moves survive a restart and the overlay can report
//! historical outcomes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS move_ops (
        compound_key TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        client_type TEXT NOT NULL,
        source_path_remote TEXT NOT NULL,
        dest_path_local TEXT NOT NULL,
        dest_path_remote TEXT NOT NULL,
        total_size INTEGER NOT NULL DEFAULT 0,
        bytes_moved INTEGER NOT NULL DEFAULT 0,
        files_total INTEGER,
        files_moved INTEGER,
        current_file TEXT,
        is_multi_file INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        error_message TEXT,
        category_name TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

/// Lifecycle state of a move operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveOpStatus {
    /// Queued, not started.
    Pending,
    /// Bytes are being copied (or the client is relocating natively).
    Moving,
    /// Copy finished; sizes are being verified.
    Verifying,
    /// Completed successfully.
    Done,
    /// Failed; `error_message` has the detail.
    Failed,
}

impl MoveOpStatus {
    /// Stable label stored in the database and shown in overlays.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Moving => "moving",
            Self::Verifying => "verifying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "moving" => Some(Self::Moving),
            "verifying" => Some(Self::Verifying),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the operation still occupies the queue.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Moving | Self::Verifying)
    }
}

/// One persisted move operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOpRow {
    /// `instanceId:hash` of the item being moved.
    pub compound_key: String,
    /// Display name of the item.
    pub name: String,
    /// Client kind label of the owning instance.
    pub client_type: String,
    /// Source path as the client sees it.
    pub source_path_remote: String,
    /// Destination path as this process sees it.
    pub dest_path_local: String,
    /// Destination path as the client sees it.
    pub dest_path_remote: String,
    /// Total payload size in bytes.
    pub total_size: i64,
    /// Bytes moved so far.
    pub bytes_moved: i64,
    /// Total files, for multi-file items.
    pub files_total: Option<i64>,
    /// Files moved so far, for multi-file items.
    pub files_moved: Option<i64>,
    /// File currently being copied.
    pub current_file: Option<String>,
    /// Whether the payload spans multiple files.
    pub is_multi_file: bool,
    /// Lifecycle state.
    pub status: MoveOpStatus,
    /// Failure detail, when failed.
    pub error_message: Option<String>,
    /// Category that drove the move.
    pub category_name: String,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

/// Store for move operations.
#[derive(Clone)]
pub struct MoveOpsStore {
    pool: SqlitePool,
}

impl MoveOpsStore {
    /// Initialise the store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create move_ops schema")?;
        Ok(Self { pool })
    }

    /// Insert or replace the row for a compound key.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn upsert(&self, row: &MoveOpRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO move_ops (compound_key, name, client_type, source_path_remote,
                 dest_path_local, dest_path_remote, total_size, bytes_moved, files_total,
                 files_moved, current_file, is_multi_file, status, error_message,
                 category_name, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(compound_key) DO UPDATE SET
                 bytes_moved = excluded.bytes_moved,
                 files_total = excluded.files_total,
                 files_moved = excluded.files_moved,
                 current_file = excluded.current_file,
                 status = excluded.status,
                 error_message = excluded.error_message,
                 updated_at = excluded.updated_at",
        )
        .bind(&row.compound_key)
        .bind(&row.name)
        .bind(&row.client_type)
        .bind(&row.source_path_remote)
        .bind(&row.dest_path_local)
        .bind(&row.dest_path_remote)
        .bind(row.total_size)
        .bind(row.bytes_moved)
        .bind(row.files_total)
        .bind(row.files_moved)
        .bind(&row.current_file)
        .bind(row.is_multi_file)
        .bind(row.status.as_str())
        .bind(&row.error_message)
        .bind(&row.category_name)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to upsert move op")?;
        Ok(())
    }

    /// Load one row.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn get(&self, compound_key: &str) -> Result<Option<MoveOpRow>> {
        let row = sqlx::query("SELECT * FROM move_ops WHERE compound_key = ?1")
            .bind(compound_key)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load move op")?;
        row.map(hydrate).transpose()
    }

    /// Load every row still occupying the queue.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn load_active(&self) -> Result<Vec<MoveOpRow>> {
        let rows = sqlx::query(
            "SELECT * FROM move_ops WHERE status IN ('pending', 'moving', 'verifying')
             ORDER BY updated_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load active move ops")?;
        rows.into_iter().map(hydrate).collect()
    }

    /// Remove the row for a compound key.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn remove(&self, compound_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM move_ops WHERE compound_key = ?1")
            .bind(compound_key)
            .execute(&self.pool)
            .await
            .context("failed to remove move op")?;
        Ok(())
    }
}

fn hydrate(row: sqlx::sqlite::SqliteRow) -> Result<MoveOpRow> {
    let status_label: String = row.try_get("status")?;
    Ok(MoveOpRow {
        compound_key: row.try_get("compound_key")?,
        name: row.try_get("name")?,
        client_type: row.try_get("client_type")?,
        source_path_remote: row.try_get("source_path_remote")?,
        dest_path_local: row.try_get("dest_path_local")?,
        dest_path_remote: row.try_get("dest_path_remote")?,
        total_size: row.try_get("total_size")?,
        bytes_moved: row.try_get("bytes_moved")?,
        files_total: row.try_get("files_total")?,
        files_moved: row.try_get("files_moved")?,
        current_file: row.try_get("current_file")?,
        is_multi_file: row.try_get("is_multi_file")?,
        status: MoveOpStatus::parse(&status_label).unwrap_or(MoveOpStatus::Failed),
        error_message: row.try_get("error_message")?,
        category_name: row.try_get("category_name")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::open_memory_pool;

    fn sample(key: &str, status: MoveOpStatus) -> MoveOpRow {
        MoveOpRow {
            compound_key: key.to_string(),
            name: "Film.iso".to_string(),
            client_type: "amule".to_string(),
            source_path_remote: "/srv/downloads/Film.iso".to_string(),
            dest_path_local: "/data/movies/Film.iso".to_string(),
            dest_path_remote: "/data/movies/Film.iso".to_string(),
            total_size: 1000,
            bytes_moved: 0,
            files_total: None,
            files_moved: None,
            current_file: None,
            is_multi_file: false,
            status,
            error_message: None,
            category_name: "Movies".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_updates_progress() {
        let store = MoveOpsStore::new(open_memory_pool().await.unwrap()).await.unwrap();
        store.upsert(&sample("a:1", MoveOpStatus::Pending)).await.unwrap();

        let mut progressed = sample("a:1", MoveOpStatus::Moving);
        progressed.bytes_moved = 500;
        store.upsert(&progressed).await.unwrap();

        let loaded = store.get("a:1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MoveOpStatus::Moving);
        assert_eq!(loaded.bytes_moved, 500);
    }

    #[tokio::test]
    async fn active_filter_excludes_finished() {
        let store = MoveOpsStore::new(open_memory_pool().await.unwrap()).await.unwrap();
        store.upsert(&sample("a:1", MoveOpStatus::Pending)).await.unwrap();
        store.upsert(&sample("a:2", MoveOpStatus::Done)).await.unwrap();
        store.upsert(&sample("a:3", MoveOpStatus::Failed)).await.unwrap();

        let active = store.load_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].compound_key, "a:1");

        store.remove("a:1").await.unwrap();
        assert!(store.get("a:1").await.unwrap().is_none());
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [
            MoveOpStatus::Pending,
            MoveOpStatus::Moving,
            MoveOpStatus::Verifying,
            MoveOpStatus::Done,
            MoveOpStatus::Failed,
        ] {
            assert_eq!(MoveOpStatus::parse(status.as_str()), Some(status));
        }
        assert!(MoveOpStatus::parse("unknown").is_none());
    }
}
