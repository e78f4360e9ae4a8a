//! Wires configuration, stores, adapters, background loops, and the server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::RngCore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use peerdeck_api::{build_router, AppContext};
use peerdeck_auth::AuthManager;
use peerdeck_categories::{CategoryManager, FsPathValidator};
use peerdeck_clients::{
    on_connect_sync, spawn_reconnect_loop, AmuleAdapter, QbittorrentAdapter, RtorrentAdapter,
    StubEcTransport,
};
use peerdeck_config::{load_config, save_config, AppConfig, ClientEntry, EnvOverlay};
use peerdeck_core::{ClientAdapter, ClientKind, ClientRegistry};
use peerdeck_data::DataStores;
use peerdeck_events::{spawn_sink_bridge, Event, EventBus};
use peerdeck_fsops::MoveManager;
use peerdeck_pipeline::{
    spawn_metrics_sampler, spawn_nightly_cleanup, spawn_scheduler, DataFetchService, NoopResolver,
    PipelineDeps,
};

use crate::error::AppError;
use crate::sink::ScriptEventSink;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn data_dir_from_env(overlay_hint: Option<&str>) -> PathBuf {
    overlay_hint
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn generate_secret() -> String {
    let mut bytes = [0_u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Load configuration, generating and persisting the session secret on
/// first save.
fn load_and_seal_config(
    config_path: &Path,
    overlay: &EnvOverlay,
) -> Result<AppConfig, AppError> {
    let mut config = load_config(config_path, overlay)?;
    if config.server.auth.session_secret.is_none() {
        info!("generating session secret");
        config.server.auth.session_secret = Some(generate_secret());
        save_config(config_path, &config, overlay)?;
    }
    Ok(config)
}

fn build_adapter(
    entry: &ClientEntry,
    instance_id: &str,
    events: &EventBus,
) -> Option<(Arc<dyn ClientAdapter>, Option<Arc<RtorrentAdapter>>)> {
    let display_name = entry
        .display_name
        .clone()
        .unwrap_or_else(|| instance_id.to_string());
    match entry.kind? {
        ClientKind::Amule => {
            let adapter: Arc<dyn ClientAdapter> = AmuleAdapter::new(
                instance_id,
                &display_name,
                entry.enabled,
                entry.password.as_deref().unwrap_or_default(),
                Arc::new(StubEcTransport),
                events.clone(),
            );
            Some((adapter, None))
        }
        ClientKind::QBittorrent => {
            match QbittorrentAdapter::new(
                instance_id,
                &display_name,
                entry.enabled,
                &entry.host,
                entry.port,
                entry.use_ssl,
                entry.username.as_deref().unwrap_or("admin"),
                entry.password.as_deref().unwrap_or_default(),
                events.clone(),
            ) {
                Ok(adapter) => Some((adapter as Arc<dyn ClientAdapter>, None)),
                Err(err) => {
                    warn!(instance = instance_id, error = %err, "qbittorrent adapter build failed");
                    None
                }
            }
        }
        ClientKind::RTorrent => {
            match RtorrentAdapter::new(
                instance_id,
                &display_name,
                entry.enabled,
                &entry.host,
                entry.port,
                entry.use_ssl,
                events.clone(),
            ) {
                Ok(adapter) => {
                    let erased: Arc<dyn ClientAdapter> = adapter.clone();
                    Some((erased, Some(adapter)))
                }
                Err(err) => {
                    warn!(instance = instance_id, error = %err, "rtorrent adapter build failed");
                    None
                }
            }
        }
    }
}

/// Spawn the task that runs connect-time category sync whenever an instance
/// comes up.
fn spawn_connect_sync(
    events: &EventBus,
    registry: Arc<ClientRegistry>,
    categories: CategoryManager,
) -> JoinHandle<()> {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            if let Event::ClientConnected { instance_id } = envelope.event {
                let Some(client) = registry.get(&instance_id).await else {
                    continue;
                };
                if let Err(err) = on_connect_sync(&client.adapter, &categories).await {
                    warn!(instance = %instance_id, error = %err, "connect-time sync failed");
                }
            }
        }
    })
}

/// Boot the whole system and serve until shutdown.
///
/// # Errors
///
/// Returns the startup failure that aborted the process.
pub async fn run() -> Result<(), AppError> {
    init_tracing();

    let overlay = EnvOverlay::from_process();
    let bootstrap_dir = data_dir_from_env(std::env::var("PEERDECK_DATA_DIR").ok().as_deref());
    let config_path = bootstrap_dir.join("config.json");
    let config = load_and_seal_config(&config_path, &overlay)?;

    let data_dir = PathBuf::from(&config.directories.data);
    let stores = DataStores::open(&data_dir).await.map_err(AppError::Storage)?;

    let events = EventBus::new();
    if config.event_scripting.enabled {
        if let Some(script_path) = config.event_scripting.script_path.clone() {
            let _bridge = spawn_sink_bridge(&events, Arc::new(ScriptEventSink::new(script_path)));
        }
    }

    let registry = Arc::new(ClientRegistry::new());
    let categories = CategoryManager::load(
        data_dir.join("categories.json"),
        registry.clone(),
        events.clone(),
        Arc::new(FsPathValidator),
    )?;

    let auth = Arc::new(AuthManager::new(
        stores.users.clone(),
        stores.sessions.clone(),
        config
            .server
            .auth
            .session_secret
            .clone()
            .unwrap_or_default(),
        config.server.auth.bcrypt_cost,
        config.server.auth.enabled,
    ));
    if let Err(err) = auth
        .ensure_admin(
            &config.server.auth.admin_username,
            config.server.auth.password.as_deref(),
        )
        .await
    {
        warn!(error = %err, "admin bootstrap failed");
    }

    // Register every configured client.
    let mut rtorrent_adapters = Vec::new();
    for entry in &config.clients {
        let Some(instance_id) = entry.effective_instance_id() else {
            continue;
        };
        let Some((adapter, rtorrent)) = build_adapter(entry, &instance_id, &events) else {
            continue;
        };
        let kind = entry.kind.expect("kind checked by build_adapter");
        registry
            .register(
                &instance_id,
                kind,
                adapter.clone(),
                &entry.display_name.clone().unwrap_or_else(|| instance_id.clone()),
            )
            .await?;
        if let Some(rtorrent) = rtorrent {
            rtorrent_adapters.push(rtorrent);
        }
    }

    let moves = MoveManager::new(
        registry.clone(),
        categories.clone(),
        stores.moves.clone(),
        events.clone(),
    );
    let _move_worker = moves.spawn_worker();

    let service = DataFetchService::new(PipelineDeps {
        registry: registry.clone(),
        categories: categories.clone(),
        history: stores.history.clone(),
        moves: stores.moves.clone(),
        ownership: stores.ownership.clone(),
        geoip: Arc::new(NoopResolver),
        hosts: Arc::new(NoopResolver),
        events: events.clone(),
        history_enabled: config.history.enabled,
    });

    // Background loops.
    let _scheduler = spawn_scheduler(service.clone());
    let _sampler = spawn_metrics_sampler(registry.clone(), stores.metrics.clone());
    let _cleanup = spawn_nightly_cleanup(
        stores.metrics.clone(),
        stores.history.clone(),
        config.history.retention_days,
    );
    let _sync = spawn_connect_sync(&events, registry.clone(), categories.clone());
    for (_, client) in registry.get_all().await {
        let _reconnect = spawn_reconnect_loop(client.adapter, events.clone());
    }
    for rtorrent in &rtorrent_adapters {
        let _tracker = rtorrent.spawn_tracker_refresh();
    }

    // First connection attempt for everything enabled.
    for (instance_id, client) in registry.get_enabled().await {
        match client.adapter.init_client().await {
            Ok(true) => info!(instance = %instance_id, "connected"),
            Ok(false) => {}
            Err(err) => warn!(instance = %instance_id, error = %err, "initial connect failed"),
        }
    }

    let ctx = AppContext::new(
        registry.clone(),
        categories,
        auth,
        service,
        moves,
        stores,
        events,
        data_dir,
        config.server.auth.trusted_proxy.clone(),
        config.integrations.torznab_api_key.clone(),
    );
    let router = build_router(ctx);

    let bind = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %bind, "listening");
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(AppError::Server)?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
    .map_err(AppError::Server)?;

    // Orderly teardown: adapters first, then the registry.
    for (instance_id, client) in registry.get_all().await {
        info!(instance = %instance_id, "shutting down adapter");
        client.adapter.shutdown().await;
    }
    registry.clear().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_long_and_random() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn data_dir_defaults_and_overrides() {
        assert_eq!(data_dir_from_env(None), PathBuf::from("./data"));
        assert_eq!(data_dir_from_env(Some("/srv/peerdeck")), PathBuf::from("/srv/peerdeck"));
    }

    #[test]
    fn config_seals_a_session_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let overlay = EnvOverlay::default();

        let first = load_and_seal_config(&path, &overlay).unwrap();
        let secret = first.server.auth.session_secret.clone().unwrap();
        assert_eq!(secret.len(), 64);

        // The secret persists across loads.
        let second = load_and_seal_config(&path, &overlay).unwrap();
        assert_eq!(second.server.auth.session_secret.unwrap(), secret);
    }
}
