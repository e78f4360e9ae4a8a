//! Session rows (`sessions.db`).
//!
//! The signed cookie carries the session id; this store holds the row the
//! id resolves to. Invalidation deletes rows, which the hub's heartbeat
//! notices within one validation cycle.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        username TEXT NOT NULL,
        is_admin INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
";

/// One stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    /// Opaque session id (the signed cookie payload).
    pub session_id: String,
    /// Owning user id.
    pub user_id: i64,
    /// Username snapshot at login time.
    pub username: String,
    /// Admin snapshot at login time.
    pub is_admin: bool,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Store for sessions.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Initialise the store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create sessions schema")?;
        Ok(Self { pool })
    }

    /// Insert a session row.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn create(&self, row: &SessionRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, username, is_admin, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&row.session_id)
        .bind(row.user_id)
        .bind(&row.username)
        .bind(row.is_admin)
        .bind(Utc::now())
        .bind(row.expires_at)
        .execute(&self.pool)
        .await
        .context("failed to insert session")?;
        Ok(())
    }

    /// Resolve a session id; expired rows are deleted and not returned.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load session")?;
        let Some(row) = row else {
            return Ok(None);
        };
        let session = SessionRow {
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            is_admin: row.try_get("is_admin")?,
            expires_at: row.try_get("expires_at")?,
        };
        if session.expires_at <= Utc::now() {
            self.delete(session_id).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Delete one session.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    /// Destroy every session belonging to a user (invalidation path).
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn delete_for_user(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("failed to delete user sessions")?;
        Ok(result.rows_affected())
    }

    /// Sweep expired rows.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("failed to sweep sessions")?;
        Ok(result.rows_affected())
    }
}
