//! Transfer telemetry samples (`metrics.db`).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        instance_id TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        upload_speed INTEGER NOT NULL DEFAULT 0,
        download_speed INTEGER NOT NULL DEFAULT 0,
        upload_total INTEGER NOT NULL DEFAULT 0,
        download_total INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_samples_instance_time
        ON samples(instance_id, recorded_at);
";

/// One telemetry sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSample {
    /// Instance the sample belongs to.
    pub instance_id: String,
    /// Sampling instant.
    pub recorded_at: DateTime<Utc>,
    /// Upload speed in bytes per second.
    pub upload_speed: i64,
    /// Download speed in bytes per second.
    pub download_speed: i64,
    /// Session upload total in bytes.
    pub upload_total: i64,
    /// Session download total in bytes.
    pub download_total: i64,
}

/// Store for telemetry samples.
#[derive(Clone)]
pub struct MetricsStore {
    pool: SqlitePool,
}

impl MetricsStore {
    /// Initialise the store, creating the schema when absent.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create metrics schema")?;
        Ok(Self { pool })
    }

    /// Append one sample.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn insert(&self, sample: &MetricsSample) -> Result<()> {
        sqlx::query(
            "INSERT INTO samples (instance_id, recorded_at, upload_speed, download_speed,
                 upload_total, download_total)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&sample.instance_id)
        .bind(sample.recorded_at)
        .bind(sample.upload_speed)
        .bind(sample.download_speed)
        .bind(sample.upload_total)
        .bind(sample.download_total)
        .execute(&self.pool)
        .await
        .context("failed to insert metrics sample")?;
        Ok(())
    }

    /// Samples for one instance within the window, oldest first.
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn range(
        &self,
        instance_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricsSample>> {
        let rows = sqlx::query(
            "SELECT * FROM samples WHERE instance_id = ?1 AND recorded_at >= ?2
             ORDER BY recorded_at",
        )
        .bind(instance_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to load metrics range")?;

        rows.into_iter()
            .map(|row| {
                Ok(MetricsSample {
                    instance_id: row.try_get("instance_id")?,
                    recorded_at: row.try_get("recorded_at")?,
                    upload_speed: row.try_get("upload_speed")?,
                    download_speed: row.try_get("download_speed")?,
                    upload_total: row.try_get("upload_total")?,
                    download_total: row.try_get("download_total")?,
                })
            })
            .collect()
    }

    /// Delete samples older than `retention_days` (daily cleanup task).
    ///
    /// # Errors
    ///
    /// Fails on query failure.
    pub async fn prune(&self, retention_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let result = sqlx::query("DELETE FROM samples WHERE recorded_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("failed to prune metrics")?;
        Ok(result.rows_affected())
    }
}
