//! The application context threaded through every handler.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use peerdeck_auth::{AuthManager, AuthedUser};
use peerdeck_categories::CategoryManager;
use peerdeck_config::TrustedProxyConfig;
use peerdeck_core::{ClientKind, ClientRegistry, NetworkClass, RegisteredClient};
use peerdeck_data::DataStores;
use peerdeck_events::EventBus;
use peerdeck_fsops::MoveManager;
use peerdeck_pipeline::DataFetchService;

/// Everything the API layer needs, wired once at bootstrap.
pub struct AppContext {
    /// Live adapter registry.
    pub registry: Arc<ClientRegistry>,
    /// Singleton category manager.
    pub categories: CategoryManager,
    /// Authentication manager.
    pub auth: Arc<AuthManager>,
    /// Pipeline service (cache + fan-out).
    pub service: Arc<DataFetchService>,
    /// Move orchestration.
    pub moves: Arc<MoveManager>,
    /// Persistence stores.
    pub data: DataStores,
    /// Domain event bus.
    pub events: EventBus,
    /// Data directory (version-seen marker and friends).
    pub data_dir: PathBuf,
    /// Package version served by `/api/version`.
    pub app_version: String,
    /// Trusted reverse-proxy settings for client-IP extraction.
    pub trusted_proxy: TrustedProxyConfig,
    /// Extra API key accepted by the Torznab endpoint.
    pub torznab_api_key: Option<String>,
    /// Whether an interactive search is currently running.
    search_active: AtomicBool,
    /// Live session ids issued by the compatibility login endpoint.
    compat_sessions: Mutex<HashSet<String>>,
}

/// Shared handle to the context.
pub type SharedContext = Arc<AppContext>;

impl AppContext {
    /// Assemble the context.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        registry: Arc<ClientRegistry>,
        categories: CategoryManager,
        auth: Arc<AuthManager>,
        service: Arc<DataFetchService>,
        moves: Arc<MoveManager>,
        data: DataStores,
        events: EventBus,
        data_dir: PathBuf,
        trusted_proxy: TrustedProxyConfig,
        torznab_api_key: Option<String>,
    ) -> SharedContext {
        Arc::new(Self {
            registry,
            categories,
            auth,
            service,
            moves,
            data,
            events,
            data_dir,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            trusted_proxy,
            torznab_api_key,
            search_active: AtomicBool::new(false),
            compat_sessions: Mutex::new(HashSet::new()),
        })
    }

    /// Issue a compatibility-facade session id.
    #[must_use]
    pub fn issue_compat_session(&self) -> String {
        let sid = peerdeck_auth::issue_session_id();
        self.compat_sessions
            .lock()
            .expect("compat session mutex poisoned")
            .insert(sid.clone());
        sid
    }

    /// Whether a compatibility session id is live.
    #[must_use]
    pub fn compat_session_valid(&self, sid: &str) -> bool {
        self.compat_sessions
            .lock()
            .expect("compat session mutex poisoned")
            .contains(sid)
    }

    /// Revoke a compatibility session id.
    pub fn revoke_compat_session(&self, sid: &str) {
        self.compat_sessions
            .lock()
            .expect("compat session mutex poisoned")
            .remove(sid);
    }

    /// Whether a search is running (sent to every fresh connection).
    #[must_use]
    pub fn search_active(&self) -> bool {
        self.search_active.load(Ordering::SeqCst)
    }

    /// Flip the search lock; returns `false` when it was already held.
    #[must_use]
    pub fn try_lock_search(&self) -> bool {
        self.search_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the search lock.
    pub fn unlock_search(&self) {
        self.search_active.store(false, Ordering::SeqCst);
    }

    /// First connected ed2k instance, which serves search, servers, and the
    /// compatibility surfaces.
    pub async fn ed2k_instance(&self) -> Option<(String, RegisteredClient)> {
        self.registry
            .get_by_kind(ClientKind::Amule)
            .await
            .into_iter()
            .find(|(_, client)| client.adapter.is_connected())
    }

    /// Reconnect enabled-but-disconnected ed2k instances (ran before every
    /// WebSocket action dispatch).
    pub async fn autoconnect_ed2k(&self) {
        for (instance_id, client) in self.registry.get_by_kind(ClientKind::Amule).await {
            if client.adapter.is_enabled() && !client.adapter.is_connected() {
                if let Err(err) = client.adapter.init_client().await {
                    tracing::debug!(instance = %instance_id, error = %err, "auto-reconnect failed");
                }
            }
        }
    }

    /// Whether `user` may mutate the item behind `compound_key`.
    pub async fn may_mutate(&self, user: &AuthedUser, compound_key: &str) -> bool {
        if user.edits_all_items() {
            return true;
        }
        let Some(user_id) = user.user_id else {
            return false;
        };
        matches!(
            self.data.ownership.owner_of(compound_key).await,
            Ok(Some(owner)) if owner == user_id
        )
    }

    /// Record ownership for a successful add, when the caller is a real
    /// user.
    pub async fn record_ownership(&self, user: &AuthedUser, compound_key: &str) {
        if let Some(user_id) = user.user_id {
            if let Err(err) = self.data.ownership.record(compound_key, user_id).await {
                tracing::warn!(error = %err, key = compound_key, "ownership record failed");
            }
        }
    }

    /// Network class of a registered instance, when known.
    pub async fn network_of(&self, instance_id: &str) -> Option<NetworkClass> {
        self.registry
            .get(instance_id)
            .await
            .map(|client| client.kind.meta().network)
    }
}
