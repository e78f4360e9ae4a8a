//! Per-item ownership records, co-located with users (`users.db`).
//!
//! An ownership row is written when an authenticated user adds a download
//! and consulted for broadcast filtering and mutation gating. Rows key by
//! compound key (`instanceId:hash`), never by bare hash.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS ownership (
        compound_key TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        added_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_ownership_user ON ownership(user_id);
";

/// Store for ownership records.
#[derive(Clone)]
pub struct OwnershipStore {
    pool: SqlitePool,
}

impl OwnershipStore {
    /// Initialise the store on the shared users pool.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create ownership schema")?;
        Ok(Self { pool })
    }

    /// Record (or re-assign) ownership of an item.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn record(&self, compound_key: &str, user_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO ownership (compound_key, user_id, added_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(compound_key) DO UPDATE SET user_id = excluded.user_id",
        )
        .bind(compound_key)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to record ownership")?;
        Ok(())
    }

    /// Owner of one item, when recorded.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn owner_of(&self, compound_key: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT user_id FROM ownership WHERE compound_key = ?1")
            .bind(compound_key)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load ownership")?;
        row.map(|row| row.try_get("user_id"))
            .transpose()
            .map_err(Into::into)
    }

    /// Full `compoundKey → userId` map, used by the broadcast transform.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn owner_map(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT compound_key, user_id FROM ownership")
            .fetch_all(&self.pool)
            .await
            .context("failed to load ownership map")?;
        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            map.insert(row.try_get("compound_key")?, row.try_get("user_id")?);
        }
        Ok(map)
    }

    /// Keys owned by one user.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn keys_for_user(&self, user_id: i64) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT compound_key FROM ownership WHERE user_id = ?1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to load user ownership")?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("compound_key").map_err(Into::into))
            .collect()
    }

    /// Remove the record for a deleted item.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn remove(&self, compound_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM ownership WHERE compound_key = ?1")
            .bind(compound_key)
            .execute(&self.pool)
            .await
            .context("failed to remove ownership")?;
        Ok(())
    }

    /// Drop records whose keys are no longer observed anywhere (orphan
    /// cleanup after deletes that bypassed the API).
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn retain_keys(&self, live_keys: &HashSet<String>) -> Result<u64> {
        let rows = sqlx::query("SELECT compound_key FROM ownership")
            .fetch_all(&self.pool)
            .await
            .context("failed to scan ownership for orphans")?;
        let mut removed = 0;
        for row in rows {
            let key: String = row.try_get("compound_key")?;
            if !live_keys.contains(&key) {
                self.remove(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::open_memory_pool;
    use crate::users::{NewUser, UserStore};

    async fn stores() -> (UserStore, OwnershipStore) {
        let pool = open_memory_pool().await.unwrap();
        let users = UserStore::new(pool.clone()).await.unwrap();
        let ownership = OwnershipStore::new(pool).await.unwrap();
        (users, ownership)
    }

    #[tokio::test]
    async fn record_and_query_round_trip() {
        let (users, ownership) = stores().await;
        let user = users
            .create(&NewUser {
                username: "alice".to_string(),
                ..NewUser::default()
            })
            .await
            .unwrap();

        ownership.record("amule-h-1:aa", user.id).await.unwrap();
        ownership.record("amule-h-1:bb", user.id).await.unwrap();

        assert_eq!(ownership.owner_of("amule-h-1:aa").await.unwrap(), Some(user.id));
        assert_eq!(ownership.owner_of("amule-h-1:zz").await.unwrap(), None);
        assert_eq!(ownership.keys_for_user(user.id).await.unwrap().len(), 2);

        ownership.remove("amule-h-1:aa").await.unwrap();
        assert_eq!(ownership.owner_of("amule-h-1:aa").await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_user_cascades_ownership() {
        let (users, ownership) = stores().await;
        let user = users
            .create(&NewUser {
                username: "bob".to_string(),
                ..NewUser::default()
            })
            .await
            .unwrap();
        ownership.record("qb-h-1:cc", user.id).await.unwrap();
        users.delete(user.id).await.unwrap();
        assert_eq!(ownership.owner_of("qb-h-1:cc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn orphan_sweep_removes_dead_keys() {
        let (users, ownership) = stores().await;
        let user = users
            .create(&NewUser {
                username: "carol".to_string(),
                ..NewUser::default()
            })
            .await
            .unwrap();
        ownership.record("a:1", user.id).await.unwrap();
        ownership.record("a:2", user.id).await.unwrap();

        let live: HashSet<String> = ["a:1".to_string()].into_iter().collect();
        let removed = ownership.retain_keys(&live).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(ownership.owner_of("a:2").await.unwrap(), None);
        assert_eq!(ownership.owner_of("a:1").await.unwrap(), Some(user.id));
    }
}
