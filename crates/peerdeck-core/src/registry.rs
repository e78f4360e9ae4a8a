//! Process-wide map of live client adapter instances.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::adapter::ClientAdapter;
use crate::error::{CoreError, CoreResult};
use crate::instance::validate_instance_id;
use crate::meta::ClientKind;

/// A registered adapter together with the metadata the registry attached.
#[derive(Clone)]
pub struct RegisteredClient {
    /// The adapter itself.
    pub adapter: Arc<dyn ClientAdapter>,
    /// Kind recorded at registration.
    pub kind: ClientKind,
    /// Display name recorded at registration.
    pub display_name: String,
}

/// Runtime map `instanceId → adapter` with kind/connected/enabled filters.
///
/// Register/unregister are rare and serialize on the inner lock; lookups
/// clone the `Arc` handles out so callers never hold the lock across awaits.
#[derive(Default)]
pub struct ClientRegistry {
    inner: RwLock<HashMap<String, RegisteredClient>>,
}

impl ClientRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under a validated instance id.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidInstanceId`] for malformed ids and
    /// [`CoreError::AlreadyRegistered`] for duplicates.
    pub async fn register(
        &self,
        instance_id: &str,
        kind: ClientKind,
        adapter: Arc<dyn ClientAdapter>,
        display_name: &str,
    ) -> CoreResult<()> {
        validate_instance_id(instance_id)?;
        let mut inner = self.inner.write().await;
        if inner.contains_key(instance_id) {
            return Err(CoreError::AlreadyRegistered(instance_id.to_string()));
        }
        info!(instance = instance_id, kind = %kind, "registering client instance");
        inner.insert(
            instance_id.to_string(),
            RegisteredClient {
                adapter,
                kind,
                display_name: display_name.to_string(),
            },
        );
        Ok(())
    }

    /// Remove an instance, returning its handle when it existed.
    pub async fn unregister(&self, instance_id: &str) -> Option<RegisteredClient> {
        let removed = self.inner.write().await.remove(instance_id);
        if removed.is_some() {
            info!(instance = instance_id, "unregistered client instance");
        }
        removed
    }

    /// Look up a single instance.
    pub async fn get(&self, instance_id: &str) -> Option<RegisteredClient> {
        self.inner.read().await.get(instance_id).cloned()
    }

    /// Look up a single instance, converting absence into an error.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] when no adapter is registered under the id.
    pub async fn require(&self, instance_id: &str) -> CoreResult<RegisteredClient> {
        self.get(instance_id)
            .await
            .ok_or_else(|| CoreError::NotFound(instance_id.to_string()))
    }

    /// All instances of one kind.
    pub async fn get_by_kind(&self, kind: ClientKind) -> Vec<(String, RegisteredClient)> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, client)| client.kind == kind)
            .map(|(id, client)| (id.clone(), client.clone()))
            .collect()
    }

    /// All instances with a live connection.
    pub async fn get_connected(&self) -> Vec<(String, RegisteredClient)> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, client)| client.adapter.is_connected())
            .map(|(id, client)| (id.clone(), client.clone()))
            .collect()
    }

    /// All enabled instances, connected or not.
    pub async fn get_enabled(&self) -> Vec<(String, RegisteredClient)> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, client)| client.adapter.is_enabled())
            .map(|(id, client)| (id.clone(), client.clone()))
            .collect()
    }

    /// Every registered instance.
    pub async fn get_all(&self) -> Vec<(String, RegisteredClient)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(id, client)| (id.clone(), client.clone()))
            .collect()
    }

    /// Whether an instance id is registered.
    pub async fn has(&self, instance_id: &str) -> bool {
        self.inner.read().await.contains_key(instance_id)
    }

    /// Number of registered instances.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drop every instance (shutdown path).
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{
        CategoryEditOutcome, CategorySpec, ClientFile, ClientIdentity, DeleteOutcome,
        DeleteRequest, EnsureCategoryOutcome, FetchBatch, NetworkHealth, NetworkStatus,
        TransferMetrics,
    };
    use crate::item::UnifiedPriority;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeAdapter {
        connected: AtomicBool,
        enabled: bool,
    }

    impl FakeAdapter {
        fn new(connected: bool, enabled: bool) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(connected),
                enabled,
            })
        }
    }

    #[async_trait]
    impl ClientAdapter for FakeAdapter {
        fn kind(&self) -> ClientKind {
            ClientKind::Amule
        }

        fn identity(&self) -> ClientIdentity {
            ClientIdentity {
                instance_id: "amule-test-4712".to_string(),
                kind: ClientKind::Amule,
                display_name: "fake".to_string(),
            }
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn init_client(&self) -> anyhow::Result<bool> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(true)
        }

        async fn shutdown(&self) {}

        async fn fetch_data(&self, _hint: &[CategorySpec]) -> anyhow::Result<FetchBatch> {
            Ok(FetchBatch::default())
        }

        async fn pause(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn resume(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self, _hash: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn set_category(
            &self,
            _hash: &str,
            _category: &str,
            _priority: Option<UnifiedPriority>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_item(
            &self,
            _hash: &str,
            _request: &DeleteRequest,
        ) -> anyhow::Result<DeleteOutcome> {
            Ok(DeleteOutcome::default())
        }

        async fn get_files(&self, _hash: &str) -> anyhow::Result<Vec<ClientFile>> {
            Ok(Vec::new())
        }

        async fn ensure_category_exists(
            &self,
            _spec: &CategorySpec,
        ) -> anyhow::Result<EnsureCategoryOutcome> {
            Ok(EnsureCategoryOutcome::default())
        }

        async fn ensure_categories_batch(&self, _specs: &[CategorySpec]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn edit_category(&self, _spec: &CategorySpec) -> anyhow::Result<CategoryEditOutcome> {
            Ok(CategoryEditOutcome::default())
        }

        async fn rename_category(&self, _old: &str, _new: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_category(&self, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_stats(&self) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }

        fn extract_metrics(&self, _raw: &Value) -> TransferMetrics {
            TransferMetrics::default()
        }

        fn network_status(&self, _raw: &Value) -> NetworkStatus {
            NetworkStatus {
                status: NetworkHealth::Red,
                text: "offline".to_string(),
                port_open: false,
                listen_port: None,
            }
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_ids() {
        let registry = ClientRegistry::new();
        let adapter = FakeAdapter::new(false, true);
        registry
            .register("amule-test-4712", ClientKind::Amule, adapter.clone(), "A")
            .await
            .unwrap();
        let duplicate = registry
            .register("amule-test-4712", ClientKind::Amule, adapter.clone(), "B")
            .await;
        assert!(matches!(duplicate, Err(CoreError::AlreadyRegistered(_))));
        let invalid = registry
            .register("bad:id", ClientKind::Amule, adapter, "C")
            .await;
        assert!(matches!(invalid, Err(CoreError::InvalidInstanceId { .. })));
    }

    #[tokio::test]
    async fn filters_by_connected_and_enabled() {
        let registry = ClientRegistry::new();
        registry
            .register("amule-a-1", ClientKind::Amule, FakeAdapter::new(true, true), "a")
            .await
            .unwrap();
        registry
            .register("amule-b-1", ClientKind::Amule, FakeAdapter::new(false, true), "b")
            .await
            .unwrap();
        registry
            .register("amule-c-1", ClientKind::Amule, FakeAdapter::new(false, false), "c")
            .await
            .unwrap();

        assert_eq!(registry.get_connected().await.len(), 1);
        assert_eq!(registry.get_enabled().await.len(), 2);
        assert_eq!(registry.get_by_kind(ClientKind::Amule).await.len(), 3);
        assert_eq!(registry.get_by_kind(ClientKind::RTorrent).await.len(), 0);
        assert!(registry.has("amule-a-1").await);

        registry.unregister("amule-a-1").await.unwrap();
        assert!(!registry.has("amule-a-1").await);
        assert!(registry.require("amule-a-1").await.is_err());

        registry.clear().await;
        assert!(registry.is_empty().await);
    }
}
