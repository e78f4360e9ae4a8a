//! Synthetic torrent-hash bi-map (`hashes.db`).
//!
//! The torrent-WebUI facade needs a 40-hex hash for every ed2k download.
//! The synthetic hash is derived by hashing the 32-hex ed2k hash and
//! truncating, then persisted both ways so the mapping survives restarts
//! and reverse lookups stay cheap.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS hash_map (
        ed2k_hash TEXT PRIMARY KEY,
        torrent_hash TEXT NOT NULL UNIQUE
    );
";

/// Store for the ed2k ↔ synthetic-torrent hash mapping.
#[derive(Clone)]
pub struct HashStore {
    pool: SqlitePool,
}

/// Derive the deterministic 40-hex synthetic hash for an ed2k hash.
#[must_use]
pub fn derive_torrent_hash(ed2k_hash: &str) -> String {
    let digest = Sha256::digest(ed2k_hash.to_ascii_lowercase().as_bytes());
    digest
        .iter()
        .take(20)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

impl HashStore {
    /// Initialise the store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create hash_map schema")?;
        Ok(Self { pool })
    }

    /// Resolve (creating on first use) the synthetic hash for an ed2k hash.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn torrent_hash_for(&self, ed2k_hash: &str) -> Result<String> {
        let ed2k = ed2k_hash.to_ascii_lowercase();
        if let Some(row) = sqlx::query("SELECT torrent_hash FROM hash_map WHERE ed2k_hash = ?1")
            .bind(&ed2k)
            .fetch_optional(&self.pool)
            .await
            .context("failed to look up synthetic hash")?
        {
            return row.try_get("torrent_hash").map_err(Into::into);
        }

        let synthetic = derive_torrent_hash(&ed2k);
        sqlx::query("INSERT OR IGNORE INTO hash_map (ed2k_hash, torrent_hash) VALUES (?1, ?2)")
            .bind(&ed2k)
            .bind(&synthetic)
            .execute(&self.pool)
            .await
            .context("failed to persist synthetic hash")?;
        Ok(synthetic)
    }

    /// Reverse lookup: the ed2k hash behind a synthetic torrent hash.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn ed2k_hash_for(&self, torrent_hash: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT ed2k_hash FROM hash_map WHERE torrent_hash = ?1")
            .bind(torrent_hash.to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await
            .context("failed to reverse-look up synthetic hash")?;
        row.map(|row| row.try_get("ed2k_hash"))
            .transpose()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::open_memory_pool;

    #[test]
    fn derivation_is_stable_and_40_hex() {
        let a = derive_torrent_hash("0123456789abcdef0123456789abcdef");
        let b = derive_torrent_hash("0123456789ABCDEF0123456789ABCDEF");
        assert_eq!(a, b, "case must not change the derived hash");
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn mapping_is_stable_and_reversible() {
        let store = HashStore::new(open_memory_pool().await.unwrap()).await.unwrap();
        let ed2k = "0123456789abcdef0123456789abcdef";

        let first = store.torrent_hash_for(ed2k).await.unwrap();
        let second = store.torrent_hash_for(ed2k).await.unwrap();
        assert_eq!(first, second);

        let back = store.ed2k_hash_for(&first).await.unwrap();
        assert_eq!(back.as_deref(), Some(ed2k));
        assert!(store.ed2k_hash_for("ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00").await.unwrap().is_none());
    }
}
