//! Path translation between client-side and app-side filesystems.

use std::collections::HashMap;

use crate::model::Category;

/// Resolved destination paths for a category move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestPaths {
    /// Destination as this process sees it.
    pub local: String,
    /// Destination as the owning client sees it.
    pub remote: String,
}

/// Strip a single trailing slash (but never the root itself).
#[must_use]
pub(crate) fn normalize_prefix(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

fn prefix_matches(path: &str, prefix: &str) -> bool {
    let prefix = normalize_prefix(prefix);
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn replace_prefix(path: &str, prefix: &str, replacement: &str) -> String {
    let prefix = normalize_prefix(prefix);
    let replacement = normalize_prefix(replacement);
    let rest = path.strip_prefix(prefix).unwrap_or("");
    format!("{replacement}{rest}")
}

/// Translate a client-reported path into the app-side path.
///
/// The category (excluding `Default`) with the longest `path` prefix match
/// wins; its per-instance/per-kind mapping (instance id first) replaces the
/// matched prefix. When nothing matches, the `Default` category's mappings
/// apply with the prefix rooted at the client's default directory. The
/// input is returned unchanged when no rule applies.
#[must_use]
pub(crate) fn translate_client_path(
    categories: &[Category],
    client_path: &str,
    kind_label: &str,
    instance_id: &str,
    client_default_paths: &HashMap<String, String>,
) -> String {
    let mut best: Option<(&Category, &str)> = None;
    for category in categories {
        if category.is_default() {
            continue;
        }
        let Some(prefix) = category.path.as_deref() else {
            continue;
        };
        if prefix.is_empty() || !prefix_matches(client_path, prefix) {
            continue;
        }
        let better = best.is_none_or(|(_, current)| {
            normalize_prefix(prefix).len() > normalize_prefix(current).len()
        });
        if better {
            best = Some((category, prefix));
        }
    }

    if let Some((category, prefix)) = best {
        if let Some(dest) = category.mapped_path(instance_id, kind_label) {
            return replace_prefix(client_path, prefix, dest);
        }
    }

    // Default-category fallback, rooted at this client's default directory.
    if let Some(default_category) = categories.iter().find(|category| category.is_default()) {
        let dest = default_category
            .path_mappings
            .get(instance_id)
            .or_else(|| default_category.path_mappings.get(kind_label));
        if let Some(dest) = dest {
            if let Some(root) = client_default_paths.get(instance_id) {
                if prefix_matches(client_path, root) {
                    return replace_prefix(client_path, root, dest);
                }
            }
        }
    }

    client_path.to_string()
}

/// Resolve where a category sends completed items for one client.
///
/// For clients that move natively the app never touches the bytes, so the
/// category `path` stands in for both sides; this is only correct when the
/// app and the client share a filesystem view.
#[must_use]
pub(crate) fn resolve_dest_paths(
    category: &Category,
    instance_id: &str,
    kind_label: &str,
    native_move: bool,
) -> Option<DestPaths> {
    if native_move {
        let path = category.path.clone()?;
        return Some(DestPaths {
            local: path.clone(),
            remote: path,
        });
    }
    let remote = category.mapped_path(instance_id, kind_label)?.to_string();
    let local = category.path.clone().unwrap_or_else(|| remote.clone());
    Some(DestPaths { local, remote })
}
