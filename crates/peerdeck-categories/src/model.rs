//! Category records and the persisted document shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use peerdeck_core::UnifiedPriority;
use serde::{Deserialize, Serialize};

/// Name of the always-present category. It can be neither renamed nor
/// deleted, and its priority is driven by the connected clients.
pub const DEFAULT_CATEGORY: &str = "Default";

/// Current version written into the persisted document.
pub const CATEGORIES_DOC_VERSION: u32 = 1;

/// One app-level category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Category {
    /// Unique name.
    pub name: String,
    /// Hex `#RRGGBB` color.
    pub color: String,
    /// App-side destination path for completed items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Per-client path overrides: key is an instance id or a client kind
    /// label, value is the destination path on that client.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub path_mappings: BTreeMap<String, String>,
    /// Free-form comment.
    pub comment: String,
    /// Unified priority (`0=Normal, 1=High, 2=Low, 3=Auto`).
    pub priority: UnifiedPriority,
    /// Native numeric category id per ed2k instance.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub amule_ids: BTreeMap<String, u32>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last modification instant.
    pub updated_at: DateTime<Utc>,
}

impl Default for Category {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: "#808080".to_string(),
            path: None,
            path_mappings: BTreeMap::new(),
            comment: String::new(),
            priority: UnifiedPriority::Normal,
            amule_ids: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

impl Category {
    /// The built-in default category.
    #[must_use]
    pub fn default_category() -> Self {
        Self {
            name: DEFAULT_CATEGORY.to_string(),
            color: "#808080".to_string(),
            comment: "Built-in default".to_string(),
            ..Self::default()
        }
    }

    /// Whether this is the built-in default category.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_CATEGORY
    }

    /// Resolve the path override for a client, instance id first, kind label
    /// second, the category path last.
    #[must_use]
    pub fn mapped_path(&self, instance_id: &str, kind_label: &str) -> Option<&str> {
        self.path_mappings
            .get(instance_id)
            .or_else(|| self.path_mappings.get(kind_label))
            .map(String::as_str)
            .or(self.path.as_deref())
    }
}

/// Partial update applied by the manager's `update` operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryUpdate {
    /// New color.
    pub color: Option<String>,
    /// New app-side path (`Some(None)` clears it).
    #[serde(
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub path: Option<Option<String>>,
    /// Replacement path-mapping table.
    pub path_mappings: Option<BTreeMap<String, String>>,
    /// New comment.
    pub comment: Option<String>,
    /// New priority.
    pub priority: Option<UnifiedPriority>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// The persisted document: `{version, categories}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoriesDoc {
    /// Document schema version.
    pub version: u32,
    /// Ordered category list; `Default` always present.
    pub categories: Vec<Category>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_path_prefers_instance_over_kind() {
        let mut category = Category {
            name: "Movies".to_string(),
            path: Some("/srv/movies".to_string()),
            ..Category::default()
        };
        category
            .path_mappings
            .insert("amule".to_string(), "/data/kind".to_string());
        category
            .path_mappings
            .insert("amule-host-4712".to_string(), "/data/instance".to_string());

        assert_eq!(
            category.mapped_path("amule-host-4712", "amule"),
            Some("/data/instance")
        );
        assert_eq!(
            category.mapped_path("amule-other-4712", "amule"),
            Some("/data/kind")
        );
        assert_eq!(
            category.mapped_path("qb-host-8080", "qbittorrent"),
            Some("/srv/movies")
        );
    }

    #[test]
    fn document_round_trips() {
        let doc = CategoriesDoc {
            version: CATEGORIES_DOC_VERSION,
            categories: vec![Category::default_category()],
        };
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: CategoriesDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(back.categories[0].name, DEFAULT_CATEGORY);
    }
}
