//! The process-wide category manager.
//!
//! CRUD serializes under one mutation lock: the local change commits and
//! persists first, then propagates concurrently to every connected client
//! with the `categories` capability, then path validation re-runs through
//! the debouncer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use peerdeck_core::{
    CategorySpec, ClientRegistry, NetworkClass, RegisteredClient, UnifiedPriority,
};
use peerdeck_events::{Event, EventBus};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::color::hex_color_to_amule;
use crate::error::CategoryError;
use crate::model::{CategoriesDoc, Category, CategoryUpdate, CATEGORIES_DOC_VERSION, DEFAULT_CATEGORY};
use crate::paths::{resolve_dest_paths, translate_client_path, DestPaths};
use crate::validate::{Debouncer, PathValidator, ValidationReport};

/// Immutable snapshot of the category set handed to adapters during sync.
#[derive(Debug, Clone)]
pub struct CategoriesSnapshot {
    categories: Vec<Category>,
}

impl CategoriesSnapshot {
    /// Every category, `Default` included.
    #[must_use]
    pub fn all(&self) -> &[Category] {
        &self.categories
    }

    /// Categories without a native numeric id on the given instance.
    ///
    /// Numeric ids only exist on the ed2k network, so instances of other
    /// network classes always see an empty list.
    #[must_use]
    pub fn unlinked_for(&self, instance_id: &str, network: NetworkClass) -> Vec<&Category> {
        if network != NetworkClass::Ed2k {
            return Vec::new();
        }
        self.categories
            .iter()
            .filter(|category| !category.amule_ids.contains_key(instance_id))
            .collect()
    }
}

struct Inner {
    file_path: PathBuf,
    registry: Arc<ClientRegistry>,
    events: EventBus,
    state: Mutex<Vec<Category>>,
    client_defaults: Mutex<HashMap<String, String>>,
    validator: Arc<dyn PathValidator>,
    debouncer: Debouncer,
}

/// Handle to the singleton category manager.
#[derive(Clone)]
pub struct CategoryManager {
    inner: Arc<Inner>,
}

impl CategoryManager {
    /// Load (or initialise) the category document at `file_path`.
    ///
    /// # Errors
    ///
    /// Fails when the document exists but cannot be parsed, or the initial
    /// save fails.
    pub fn load(
        file_path: PathBuf,
        registry: Arc<ClientRegistry>,
        events: EventBus,
        validator: Arc<dyn PathValidator>,
    ) -> Result<Self, CategoryError> {
        let mut categories = if file_path.exists() {
            let raw = std::fs::read_to_string(&file_path)?;
            let doc: CategoriesDoc = serde_json::from_str(&raw)
                .map_err(|err| CategoryError::Malformed(err.to_string()))?;
            doc.categories
        } else {
            Vec::new()
        };

        if !categories.iter().any(Category::is_default) {
            categories.insert(0, Category::default_category());
        }
        write_doc(&file_path, &categories)?;

        Ok(Self {
            inner: Arc::new(Inner {
                file_path,
                registry,
                events,
                state: Mutex::new(categories),
                client_defaults: Mutex::new(HashMap::new()),
                validator,
                debouncer: Debouncer::new(),
            }),
        })
    }

    async fn persist(&self, categories: &[Category]) -> Result<(), CategoryError> {
        write_doc(&self.inner.file_path, categories)
    }

    /// Every category in order.
    pub async fn list(&self) -> Vec<Category> {
        self.inner.state.lock().await.clone()
    }

    /// One category by name.
    pub async fn get(&self, name: &str) -> Option<Category> {
        self.inner
            .state
            .lock()
            .await
            .iter()
            .find(|category| category.name == name)
            .cloned()
    }

    /// Immutable snapshot for adapters.
    pub async fn snapshot(&self) -> CategoriesSnapshot {
        CategoriesSnapshot {
            categories: self.inner.state.lock().await.clone(),
        }
    }

    /// Create a category and sync it to every capable connected client.
    ///
    /// # Errors
    ///
    /// Fails for duplicate names, bad colors, or persistence failure.
    pub async fn create(&self, category: Category) -> Result<Category, CategoryError> {
        hex_color_to_amule(&category.color)?;
        let created = {
            let mut state = self.inner.state.lock().await;
            if state.iter().any(|existing| existing.name == category.name) {
                return Err(CategoryError::AlreadyExists(category.name));
            }
            let mut created = category;
            created.created_at = chrono::Utc::now();
            created.updated_at = created.created_at;
            state.push(created.clone());
            self.persist(&state).await?;
            created
        };

        info!(category = %created.name, "category created");
        let links = self
            .for_each_capable_client(None, |id, client| {
                let spec = self.spec_for(&created, &id, client.kind.as_str());
                let adapter = client.adapter.clone();
                async move {
                    match adapter.ensure_category_exists(&spec).await {
                        Ok(outcome) => outcome.amule_id.map(|native| (id, native)),
                        Err(err) => {
                            warn!(instance = %id, error = %err, "category create sync failed");
                            None
                        }
                    }
                }
            })
            .await;
        for (instance_id, native_id) in links.into_iter().flatten() {
            self.link_amule_id(&created.name, &instance_id, native_id).await?;
        }

        self.inner.events.publish(Event::CategoryCreated {
            name: created.name.clone(),
        });
        let _ = self.validate_all_paths().await;
        Ok(created)
    }

    /// Update a category; returns the new state plus any readback
    /// mismatches reported by clients (local state persists regardless).
    ///
    /// # Errors
    ///
    /// Fails for unknown names, protected `Default` fields, bad colors, or
    /// persistence failure.
    pub async fn update(
        &self,
        name: &str,
        update: CategoryUpdate,
    ) -> Result<(Category, Vec<String>), CategoryError> {
        if let Some(color) = update.color.as_deref() {
            hex_color_to_amule(color)?;
        }
        let updated = {
            let mut state = self.inner.state.lock().await;
            let category = state
                .iter_mut()
                .find(|category| category.name == name)
                .ok_or_else(|| CategoryError::NotFound(name.to_string()))?;
            if category.is_default() && update.priority.is_some() {
                return Err(CategoryError::CannotChangeDefaultPriority);
            }
            if let Some(color) = update.color {
                category.color = color;
            }
            if let Some(path) = update.path {
                category.path = path;
            }
            if let Some(path_mappings) = update.path_mappings {
                category.path_mappings = path_mappings;
            }
            if let Some(comment) = update.comment {
                category.comment = comment;
            }
            if let Some(priority) = update.priority {
                category.priority = priority;
            }
            category.updated_at = chrono::Utc::now();
            let updated = category.clone();
            self.persist(&state).await?;
            updated
        };

        let mismatch_lists = self
            .for_each_capable_client(None, |id, client| {
                let spec = self.spec_for(&updated, &id, client.kind.as_str());
                let adapter = client.adapter.clone();
                async move {
                    match adapter.edit_category(&spec).await {
                        Ok(outcome) if !outcome.verified => Some(
                            outcome
                                .mismatches
                                .into_iter()
                                .map(|field| format!("{id}: {field}"))
                                .collect::<Vec<_>>(),
                        ),
                        Ok(_) => None,
                        Err(err) => {
                            warn!(instance = %id, error = %err, "category update sync failed");
                            Some(vec![format!("{id}: {err}")])
                        }
                    }
                }
            })
            .await;
        let mismatches: Vec<String> = mismatch_lists.into_iter().flatten().flatten().collect();

        self.inner.events.publish(Event::CategoryUpdated {
            name: updated.name.clone(),
        });
        let _ = self.validate_all_paths().await;
        Ok((updated, mismatches))
    }

    /// Rename a category on the app and on every capable client.
    ///
    /// # Errors
    ///
    /// Rejects `Default`, duplicate targets, and unknown names.
    pub async fn rename(&self, old_name: &str, new_name: &str) -> Result<Category, CategoryError> {
        if old_name == DEFAULT_CATEGORY {
            return Err(CategoryError::CannotRenameDefault);
        }
        let renamed = {
            let mut state = self.inner.state.lock().await;
            if state.iter().any(|category| category.name == new_name) {
                return Err(CategoryError::AlreadyExists(new_name.to_string()));
            }
            let category = state
                .iter_mut()
                .find(|category| category.name == old_name)
                .ok_or_else(|| CategoryError::NotFound(old_name.to_string()))?;
            category.name = new_name.to_string();
            category.updated_at = chrono::Utc::now();
            let renamed = category.clone();
            self.persist(&state).await?;
            renamed
        };

        let old = old_name.to_string();
        let new = new_name.to_string();
        let _ = self
            .for_each_capable_client(None, move |id, client| {
                let adapter = client.adapter.clone();
                let old = old.clone();
                let new = new.clone();
                async move {
                    if let Err(err) = adapter.rename_category(&old, &new).await {
                        warn!(instance = %id, error = %err, "category rename sync failed");
                    }
                }
            })
            .await;

        self.inner.events.publish(Event::CategoryUpdated {
            name: renamed.name.clone(),
        });
        Ok(renamed)
    }

    /// Delete a category everywhere.
    ///
    /// # Errors
    ///
    /// Rejects `Default` and unknown names.
    pub async fn delete(&self, name: &str) -> Result<(), CategoryError> {
        if name == DEFAULT_CATEGORY {
            return Err(CategoryError::CannotDeleteDefault);
        }
        {
            let mut state = self.inner.state.lock().await;
            let before = state.len();
            state.retain(|category| category.name != name);
            if state.len() == before {
                return Err(CategoryError::NotFound(name.to_string()));
            }
            self.persist(&state).await?;
        }

        let target = name.to_string();
        let _ = self
            .for_each_capable_client(None, move |id, client| {
                let adapter = client.adapter.clone();
                let target = target.clone();
                async move {
                    if let Err(err) = adapter.delete_category(&target).await {
                        warn!(instance = %id, error = %err, "category delete sync failed");
                    }
                }
            })
            .await;

        self.inner.events.publish(Event::CategoryDeleted {
            name: name.to_string(),
        });
        let _ = self.validate_all_paths().await;
        Ok(())
    }

    /// Adopt a category reported by a client during its connect-time sync.
    /// Existing categories are left untouched.
    ///
    /// # Errors
    ///
    /// Fails on persistence failure.
    pub async fn import_category(&self, spec: &CategorySpec) -> Result<(), CategoryError> {
        let mut state = self.inner.state.lock().await;
        if state.iter().any(|category| category.name == spec.name) {
            return Ok(());
        }
        info!(category = %spec.name, "importing category from client");
        state.push(Category {
            name: spec.name.clone(),
            color: if spec.color.is_empty() {
                "#808080".to_string()
            } else {
                spec.color.clone()
            },
            path: spec.path.clone(),
            comment: spec.comment.clone(),
            priority: spec.priority.unwrap_or(UnifiedPriority::Normal),
            ..Category::default()
        });
        self.persist(&state).await
    }

    /// Record the native numeric id an ed2k instance assigned to a category.
    ///
    /// # Errors
    ///
    /// Fails for unknown categories or persistence failure.
    pub async fn link_amule_id(
        &self,
        name: &str,
        instance_id: &str,
        native_id: u32,
    ) -> Result<(), CategoryError> {
        let mut state = self.inner.state.lock().await;
        let category = state
            .iter_mut()
            .find(|category| category.name == name)
            .ok_or_else(|| CategoryError::NotFound(name.to_string()))?;
        category.amule_ids.insert(instance_id.to_string(), native_id);
        self.persist(&state).await
    }

    /// Track a client instance's default download directory, used by the
    /// `Default` category's path translation fallback.
    pub async fn set_client_default_path(&self, instance_id: &str, path: &str) {
        self.inner
            .client_defaults
            .lock()
            .await
            .insert(instance_id.to_string(), path.to_string());
    }

    /// Translate a client-reported path into the app-side path (§ path
    /// translation rules: longest prefix, instance over kind, `Default`
    /// fallback, pass-through).
    pub async fn translate_path(
        &self,
        client_path: &str,
        kind_label: &str,
        instance_id: &str,
    ) -> String {
        let state = self.inner.state.lock().await;
        let defaults = self.inner.client_defaults.lock().await;
        translate_client_path(&state, client_path, kind_label, instance_id, &defaults)
    }

    /// Resolve the destination pair for moving an item of `category_name`
    /// on the given instance.
    pub async fn resolve_dest_paths(
        &self,
        category_name: &str,
        instance_id: &str,
        kind_label: &str,
        native_move: bool,
    ) -> Option<DestPaths> {
        let state = self.inner.state.lock().await;
        let category = state
            .iter()
            .find(|category| category.name == category_name)?;
        resolve_dest_paths(category, instance_id, kind_label, native_move)
    }

    /// Push the full category set to every other connected capable client
    /// in one batch call per client.
    pub async fn propagate_to_other_clients(&self, exclude_instance: &str) {
        let categories = self.list().await;
        let manager = self.clone();
        let _ = self
            .for_each_capable_client(Some(exclude_instance.to_string()), move |id, client| {
                let specs: Vec<CategorySpec> = categories
                    .iter()
                    .map(|category| manager.spec_for(category, &id, client.kind.as_str()))
                    .collect();
                let adapter = client.adapter.clone();
                async move {
                    if let Err(err) = adapter.ensure_categories_batch(&specs).await {
                        warn!(instance = %id, error = %err, "category batch propagation failed");
                    }
                }
            })
            .await;
    }

    /// Build the per-client category spec list handed to `fetch_data`.
    pub async fn specs_for(&self, instance_id: &str, kind_label: &str) -> Vec<CategorySpec> {
        self.list()
            .await
            .iter()
            .map(|category| self.spec_for(category, instance_id, kind_label))
            .collect()
    }

    fn spec_for(&self, category: &Category, instance_id: &str, kind_label: &str) -> CategorySpec {
        CategorySpec {
            name: category.name.clone(),
            path: category
                .mapped_path(instance_id, kind_label)
                .map(str::to_string),
            comment: category.comment.clone(),
            color: category.color.clone(),
            priority: Some(category.priority),
        }
    }

    /// Validate every configured path, coalescing rapid callers into one
    /// pass over a 500 ms window.
    pub async fn validate_all_paths(&self) -> Arc<ValidationReport> {
        let manager = self.clone();
        self.inner
            .debouncer
            .run(move || async move { manager.run_validation_pass().await })
            .await
    }

    async fn run_validation_pass(&self) -> ValidationReport {
        let categories = self.list().await;
        let defaults = self.inner.client_defaults.lock().await.clone();
        let native_move_keys = self.native_move_keys().await;

        let mut report = ValidationReport::new();
        for category in &categories {
            let mut paths = HashMap::new();
            if category.is_default() {
                for path in defaults.values() {
                    paths.insert(path.clone(), self.inner.validator.probe(path).await);
                }
            } else if !category.path_mappings.is_empty() {
                for (key, path) in &category.path_mappings {
                    // Clients that move natively handle their own paths.
                    if native_move_keys.contains(key) {
                        continue;
                    }
                    paths.insert(path.clone(), self.inner.validator.probe(path).await);
                }
            } else if let Some(path) = &category.path {
                paths.insert(path.clone(), self.inner.validator.probe(path).await);
            }
            report.insert(category.name.clone(), paths);
        }
        report
    }

    async fn native_move_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for (id, client) in self.inner.registry.get_all().await {
            if client.kind.meta().flags.native_move {
                keys.push(id);
                let label = client.kind.as_str().to_string();
                if !keys.contains(&label) {
                    keys.push(label);
                }
            }
        }
        keys
    }

    async fn for_each_capable_client<F, Fut, T>(
        &self,
        exclude_instance: Option<String>,
        build: F,
    ) -> Vec<T>
    where
        F: Fn(String, RegisteredClient) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let clients = self.inner.registry.get_connected().await;
        let tasks = clients
            .into_iter()
            .filter(|(id, client)| {
                client.kind.meta().flags.categories
                    && exclude_instance.as_deref() != Some(id.as_str())
            })
            .map(|(id, client)| build(id, client));
        join_all(tasks).await
    }
}

fn write_doc(path: &std::path::Path, categories: &[Category]) -> Result<(), CategoryError> {
    let doc = CategoriesDoc {
        version: CATEGORIES_DOC_VERSION,
        categories: categories.to_vec(),
    };
    let pretty = serde_json::to_string_pretty(&doc)
        .map_err(|err| CategoryError::Malformed(err.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, pretty)?;
    Ok(())
}
