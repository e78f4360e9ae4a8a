//! Background loops: the auto-refresh tick, telemetry sampling, and the
//! nightly cleanup.

use std::sync::Arc;

use chrono::{Local, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use peerdeck_core::ClientRegistry;
use peerdeck_data::{HistoryStore, MetricsSample, MetricsStore};

use crate::service::DataFetchService;

/// Default auto-refresh period.
pub const TICK_PERIOD: Duration = Duration::from_secs(3);

/// How often telemetry samples are written.
const METRICS_PERIOD: Duration = Duration::from_secs(60);

/// Days of telemetry kept by the nightly cleanup.
const METRICS_RETENTION_DAYS: u32 = 30;

/// Local hour at which the nightly cleanup runs.
const CLEANUP_HOUR: u32 = 3;

/// Spawn the auto-refresh loop. Ticks are strictly sequential: the next
/// tick starts only after the previous one completed, and an error never
/// stops the loop (the next tick is the recovery attempt).
pub fn spawn_scheduler(service: Arc<DataFetchService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = service.run_tick().await {
                error!(error = %err, "pipeline tick failed; retrying next period");
            }
        }
    })
}

/// Spawn the telemetry sampler: one sample per connected instance per
/// minute.
pub fn spawn_metrics_sampler(
    registry: Arc<ClientRegistry>,
    metrics: MetricsStore,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(METRICS_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for (instance_id, client) in registry.get_connected().await {
                let raw = match client.adapter.get_stats().await {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!(instance = %instance_id, error = %err, "stats fetch failed");
                        continue;
                    }
                };
                let extracted = client.adapter.extract_metrics(&raw);
                let sample = MetricsSample {
                    instance_id: instance_id.clone(),
                    recorded_at: Utc::now(),
                    upload_speed: extracted.upload_speed.min(i64::MAX as u64) as i64,
                    download_speed: extracted.download_speed.min(i64::MAX as u64) as i64,
                    upload_total: extracted.upload_total.min(i64::MAX as u64) as i64,
                    download_total: extracted.download_total.min(i64::MAX as u64) as i64,
                };
                if let Err(err) = metrics.insert(&sample).await {
                    warn!(instance = %instance_id, error = %err, "metrics insert failed");
                }
            }
        }
    })
}

/// Spawn the nightly cleanup: at local hour three, prune telemetry older
/// than thirty days and history beyond its retention window.
pub fn spawn_nightly_cleanup(
    metrics: MetricsStore,
    history: HistoryStore,
    history_retention_days: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(until_next_cleanup()).await;
            info!("running nightly cleanup");
            match metrics.prune(METRICS_RETENTION_DAYS).await {
                Ok(removed) => info!(removed, "pruned telemetry samples"),
                Err(err) => warn!(error = %err, "telemetry prune failed"),
            }
            match history.prune(history_retention_days).await {
                Ok(removed) => info!(removed, "pruned history rows"),
                Err(err) => warn!(error = %err, "history prune failed"),
            }
        }
    })
}

fn until_next_cleanup() -> Duration {
    let now = Local::now();
    let target_time = NaiveTime::from_hms_opt(CLEANUP_HOUR, 0, 0).expect("static time is valid");
    let today_target = now.date_naive().and_time(target_time);
    let next = if now.naive_local() < today_target {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    };
    let wait = next - now.naive_local();
    wait.to_std().unwrap_or(Duration::from_secs(60 * 60))
}
