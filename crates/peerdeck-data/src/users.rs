//! User accounts, capabilities, and API keys (`users.db`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::DataError;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE COLLATE NOCASE,
        password_hash TEXT,
        is_admin INTEGER NOT NULL DEFAULT 0,
        disabled INTEGER NOT NULL DEFAULT 0,
        api_key TEXT UNIQUE,
        last_login_at TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS user_capabilities (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        capability TEXT NOT NULL,
        PRIMARY KEY (user_id, capability)
    );
";

/// A stored user with its capability set loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Row id.
    pub id: i64,
    /// Unique username (case-insensitive).
    pub username: String,
    /// Bcrypt hash; `None` until the account sets a password.
    pub password_hash: Option<String>,
    /// Whether the account is an administrator.
    pub is_admin: bool,
    /// Whether the account is disabled.
    pub disabled: bool,
    /// API key (admin accounts only).
    pub api_key: Option<String>,
    /// Capability labels granted to the account.
    pub capabilities: Vec<String>,
    /// Last successful login.
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Payload for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Username; validated against the `3–32 × [A-Za-z0-9_]` rule.
    pub username: String,
    /// Pre-hashed password, when the account starts with one.
    pub password_hash: Option<String>,
    /// Whether the account is an administrator.
    pub is_admin: bool,
    /// Initial capability labels.
    pub capabilities: Vec<String>,
}

/// Partial update applied to a user row.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New username.
    pub username: Option<String>,
    /// New password hash (`Some(None)` clears it).
    pub password_hash: Option<Option<String>>,
    /// New admin flag.
    pub is_admin: Option<bool>,
    /// New disabled flag.
    pub disabled: Option<bool>,
    /// New API key (`Some(None)` clears it).
    pub api_key: Option<Option<String>>,
}

/// Store for user accounts.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Check the username shape rule shared by creation and rename.
#[must_use]
pub fn username_is_valid(username: &str) -> bool {
    (3..=32).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl UserStore {
    /// Initialise the store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create users schema")?;
        Ok(Self { pool })
    }

    /// Underlying pool, shared with the ownership store.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a user and its capability rows in one transaction.
    ///
    /// # Errors
    ///
    /// Fails for invalid or taken usernames, or on query failure.
    pub async fn create(&self, new: &NewUser) -> Result<UserRecord> {
        if !username_is_valid(&new.username) {
            return Err(DataError::InvalidUsername(new.username.clone()).into());
        }
        if self.by_username(&new.username).await?.is_some() {
            return Err(DataError::UsernameTaken(new.username.clone()).into());
        }

        let mut tx = self.pool.begin().await.context("begin create-user tx")?;
        let id = sqlx::query(
            "INSERT INTO users (username, password_hash, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(new.is_admin)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("failed to insert user")?
        .last_insert_rowid();

        for capability in &new.capabilities {
            sqlx::query(
                "INSERT OR IGNORE INTO user_capabilities (user_id, capability) VALUES (?1, ?2)",
            )
            .bind(id)
            .bind(capability)
            .execute(&mut *tx)
            .await
            .context("failed to insert capability")?;
        }
        tx.commit().await.context("commit create-user tx")?;

        self.by_id(id)
            .await?
            .ok_or_else(|| DataError::UserNotFound(id).into())
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load user by id")?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Fetch a user by (case-insensitive) username.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?1 COLLATE NOCASE")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load user by username")?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Fetch a user by API key.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn by_api_key(&self, api_key: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE api_key = ?1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load user by api key")?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// List every user.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn list(&self) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .context("failed to list users")?;
        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.hydrate(row).await?);
        }
        Ok(users)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Fails for invalid/taken usernames, missing users, or query failure.
    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<UserRecord> {
        if let Some(username) = &update.username {
            if !username_is_valid(username) {
                return Err(DataError::InvalidUsername(username.clone()).into());
            }
            if let Some(existing) = self.by_username(username).await? {
                if existing.id != id {
                    return Err(DataError::UsernameTaken(username.clone()).into());
                }
            }
        }

        let mut tx = self.pool.begin().await.context("begin update-user tx")?;
        if let Some(username) = &update.username {
            sqlx::query("UPDATE users SET username = ?1 WHERE id = ?2")
                .bind(username)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("failed to rename user")?;
        }
        if let Some(password_hash) = &update.password_hash {
            sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
                .bind(password_hash)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("failed to update password hash")?;
        }
        if let Some(is_admin) = update.is_admin {
            sqlx::query("UPDATE users SET is_admin = ?1 WHERE id = ?2")
                .bind(is_admin)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("failed to update admin flag")?;
        }
        if let Some(disabled) = update.disabled {
            sqlx::query("UPDATE users SET disabled = ?1 WHERE id = ?2")
                .bind(disabled)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("failed to update disabled flag")?;
        }
        if let Some(api_key) = &update.api_key {
            sqlx::query("UPDATE users SET api_key = ?1 WHERE id = ?2")
                .bind(api_key)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("failed to update api key")?;
        }
        tx.commit().await.context("commit update-user tx")?;

        self.by_id(id)
            .await?
            .ok_or_else(|| DataError::UserNotFound(id).into())
    }

    /// Replace the capability set in one transaction.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn set_capabilities(&self, id: i64, capabilities: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin capabilities tx")?;
        sqlx::query("DELETE FROM user_capabilities WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("failed to clear capabilities")?;
        for capability in capabilities {
            sqlx::query(
                "INSERT OR IGNORE INTO user_capabilities (user_id, capability) VALUES (?1, ?2)",
            )
            .bind(id)
            .bind(capability)
            .execute(&mut *tx)
            .await
            .context("failed to insert capability")?;
        }
        tx.commit().await.context("commit capabilities tx")
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn record_login(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to record login")?;
        Ok(())
    }

    /// Delete a user; capability rows cascade.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn hydrate(&self, row: sqlx::sqlite::SqliteRow) -> Result<UserRecord> {
        let id: i64 = row.try_get("id")?;
        let capabilities = sqlx::query(
            "SELECT capability FROM user_capabilities WHERE user_id = ?1 ORDER BY capability",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load capabilities")?
        .into_iter()
        .map(|cap_row| cap_row.try_get::<String, _>("capability"))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(UserRecord {
            id,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            is_admin: row.try_get("is_admin")?,
            disabled: row.try_get("disabled")?,
            api_key: row.try_get("api_key")?,
            capabilities,
            last_login_at: row.try_get("last_login_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::open_memory_pool;

    async fn store() -> UserStore {
        UserStore::new(open_memory_pool().await.unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_lookup_case_insensitive() {
        let store = store().await;
        let user = store
            .create(&NewUser {
                username: "Alice_01".to_string(),
                password_hash: Some("$2b$10$hash".to_string()),
                is_admin: false,
                capabilities: vec!["search".to_string(), "add_downloads".to_string()],
            })
            .await
            .unwrap();

        let found = store.by_username("alice_01").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.capabilities, vec!["add_downloads", "search"]);
    }

    #[tokio::test]
    async fn username_rules_are_enforced() {
        let store = store().await;
        for bad in ["ab", "has space", "ünïcode", &"x".repeat(33)] {
            let result = store
                .create(&NewUser {
                    username: bad.to_string(),
                    ..NewUser::default()
                })
                .await;
            assert!(result.is_err(), "username '{bad}' should be rejected");
        }
        store
            .create(&NewUser {
                username: "valid_name".to_string(),
                ..NewUser::default()
            })
            .await
            .unwrap();
        let dup = store
            .create(&NewUser {
                username: "VALID_NAME".to_string(),
                ..NewUser::default()
            })
            .await;
        assert!(dup.is_err(), "case-insensitive duplicate should be rejected");
    }

    #[tokio::test]
    async fn update_and_capability_replace() {
        let store = store().await;
        let user = store
            .create(&NewUser {
                username: "bob".to_string(),
                ..NewUser::default()
            })
            .await
            .unwrap();

        let renamed = store
            .update(
                user.id,
                &UserUpdate {
                    username: Some("robert".to_string()),
                    disabled: Some(true),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.username, "robert");
        assert!(renamed.disabled);

        store
            .set_capabilities(user.id, &["view_history".to_string()])
            .await
            .unwrap();
        let reloaded = store.by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.capabilities, vec!["view_history"]);

        assert!(store.delete(user.id).await.unwrap());
        assert!(store.by_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn api_key_lookup() {
        let store = store().await;
        let user = store
            .create(&NewUser {
                username: "admin".to_string(),
                is_admin: true,
                ..NewUser::default()
            })
            .await
            .unwrap();
        store
            .update(
                user.id,
                &UserUpdate {
                    api_key: Some(Some("key-123".to_string())),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
        let found = store.by_api_key("key-123").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(store.by_api_key("nope").await.unwrap().is_none());
    }
}
