//! Download history (`history.db`).
//!
//! The pipeline backfills `added_at` on unified items from here, and the
//! history surface lists past downloads per user.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS history (
        compound_key TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        size INTEGER NOT NULL DEFAULT 0,
        user_id INTEGER,
        added_at TEXT NOT NULL,
        completed_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_history_added ON history(added_at);
";

/// One history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// `instanceId:hash` of the item.
    pub compound_key: String,
    /// Display name at record time.
    pub name: String,
    /// Payload size in bytes.
    pub size: i64,
    /// User who added the item, when known.
    pub user_id: Option<i64>,
    /// When the item was first observed.
    pub added_at: DateTime<Utc>,
    /// When the item completed, when observed.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Store for download history.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Initialise the store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create history schema")?;
        Ok(Self { pool })
    }

    /// Record an item the first time it is seen; later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn record_added(
        &self,
        compound_key: &str,
        name: &str,
        size: i64,
        user_id: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO history (compound_key, name, size, user_id, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(compound_key)
        .bind(name)
        .bind(size)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to record history entry")?;
        Ok(())
    }

    /// Stamp the completion instant once.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn record_completed(&self, compound_key: &str) -> Result<()> {
        sqlx::query(
            "UPDATE history SET completed_at = ?1
             WHERE compound_key = ?2 AND completed_at IS NULL",
        )
        .bind(Utc::now())
        .bind(compound_key)
        .execute(&self.pool)
        .await
        .context("failed to record completion")?;
        Ok(())
    }

    /// `compoundKey → addedAt` for the supplied keys (pipeline backfill).
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn added_at_map(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut map = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(500) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT compound_key, added_at FROM history WHERE compound_key IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql);
            for key in chunk {
                query = query.bind(key);
            }
            for row in query
                .fetch_all(&self.pool)
                .await
                .context("failed to load added-at map")?
            {
                map.insert(row.try_get("compound_key")?, row.try_get("added_at")?);
            }
        }
        Ok(map)
    }

    /// List history, newest first.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn list(&self, limit: i64, user_id: Option<i64>) -> Result<Vec<HistoryEntry>> {
        let rows = match user_id {
            Some(user) => {
                sqlx::query(
                    "SELECT * FROM history WHERE user_id = ?1 ORDER BY added_at DESC LIMIT ?2",
                )
                .bind(user)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM history ORDER BY added_at DESC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("failed to list history")?;

        rows.into_iter()
            .map(|row| {
                Ok(HistoryEntry {
                    compound_key: row.try_get("compound_key")?,
                    name: row.try_get("name")?,
                    size: row.try_get("size")?,
                    user_id: row.try_get("user_id")?,
                    added_at: row.try_get("added_at")?,
                    completed_at: row.try_get("completed_at")?,
                })
            })
            .collect()
    }

    /// Delete every history row.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM history")
            .execute(&self.pool)
            .await
            .context("failed to clear history")?;
        Ok(result.rows_affected())
    }

    /// Prune rows older than `retention_days`.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn prune(&self, retention_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let result = sqlx::query("DELETE FROM history WHERE added_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune history")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::open_memory_pool;

    async fn store() -> HistoryStore {
        HistoryStore::new(open_memory_pool().await.unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn first_record_wins() {
        let store = store().await;
        store.record_added("a:1", "first", 10, Some(1)).await.unwrap();
        store.record_added("a:1", "second", 20, Some(2)).await.unwrap();
        let entries = store.list(10, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "first");
    }

    #[tokio::test]
    async fn added_at_map_covers_requested_keys() {
        let store = store().await;
        store.record_added("a:1", "x", 1, None).await.unwrap();
        store.record_added("a:2", "y", 2, None).await.unwrap();
        let map = store
            .added_at_map(&["a:1".to_string(), "a:3".to_string()])
            .await
            .unwrap();
        assert!(map.contains_key("a:1"));
        assert!(!map.contains_key("a:3"));
    }

    #[tokio::test]
    async fn per_user_listing_and_clear() {
        let store = store().await;
        store.record_added("a:1", "x", 1, Some(1)).await.unwrap();
        store.record_added("a:2", "y", 2, Some(2)).await.unwrap();
        assert_eq!(store.list(10, Some(1)).await.unwrap().len(), 1);
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list(10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_is_stamped_once() {
        let store = store().await;
        store.record_added("a:1", "x", 1, None).await.unwrap();
        store.record_completed("a:1").await.unwrap();
        let first = store.list(1, None).await.unwrap()[0].completed_at.unwrap();
        store.record_completed("a:1").await.unwrap();
        let second = store.list(1, None).await.unwrap()[0].completed_at.unwrap();
        assert_eq!(first, second);
    }
}
