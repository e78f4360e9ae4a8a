//! Connect-time category synchronisation.
//!
//! Runs once per adapter after its connection comes up: adopt the client's
//! native categories, push the app-wide set back, link native numeric ids
//! for ed2k instances, record the client default directory, and re-validate
//! paths (the validation debouncer absorbs the burst when several adapters
//! connect together).

use std::sync::Arc;

use anyhow::Context;
use peerdeck_categories::CategoryManager;
use peerdeck_core::{ClientAdapter, NetworkClass};
use tracing::{info, warn};

/// Synchronise one freshly-connected adapter with the category manager.
///
/// # Errors
///
/// Fails when pushing the app-wide set to the client fails; import and
/// linking problems are logged and skipped.
pub async fn on_connect_sync(
    adapter: &Arc<dyn ClientAdapter>,
    categories: &CategoryManager,
) -> anyhow::Result<()> {
    let identity = adapter.identity();
    let kind_label = identity.kind.as_str();

    match adapter.default_directory().await {
        Ok(Some(directory)) => {
            categories
                .set_client_default_path(&identity.instance_id, &directory)
                .await;
        }
        Ok(None) => {}
        Err(err) => {
            warn!(instance = %identity.instance_id, error = %err, "default directory probe failed");
        }
    }

    match adapter.native_categories().await {
        Ok(native) => {
            for spec in &native {
                if let Err(err) = categories.import_category(spec).await {
                    warn!(
                        instance = %identity.instance_id,
                        category = %spec.name,
                        error = %err,
                        "category import failed"
                    );
                }
            }
        }
        Err(err) => {
            warn!(instance = %identity.instance_id, error = %err, "native category fetch failed");
        }
    }

    let specs = categories
        .specs_for(&identity.instance_id, kind_label)
        .await;
    adapter
        .ensure_categories_batch(&specs)
        .await
        .context("category batch push failed")?;

    if identity.kind.meta().network == NetworkClass::Ed2k {
        let snapshot = categories.snapshot().await;
        for category in snapshot.unlinked_for(&identity.instance_id, NetworkClass::Ed2k) {
            match adapter.ensure_amule_category_id(&category.name).await {
                Ok(native_id) => {
                    if let Err(err) = categories
                        .link_amule_id(&category.name, &identity.instance_id, native_id)
                        .await
                    {
                        warn!(
                            instance = %identity.instance_id,
                            category = %category.name,
                            error = %err,
                            "id link failed"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        instance = %identity.instance_id,
                        category = %category.name,
                        error = %err,
                        "native id resolution failed"
                    );
                }
            }
        }
    }

    let _ = categories.validate_all_paths().await;
    info!(instance = %identity.instance_id, "connect-time category sync complete");
    Ok(())
}
