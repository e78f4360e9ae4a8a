//! Per-connection broadcast transform.
//!
//! A single assembled item list produces N tailored payloads without N
//! pulls: the hub applies this transform once per recipient.

use std::collections::HashMap;

use peerdeck_auth::AuthedUser;
use peerdeck_core::UnifiedItem;
use serde_json::{json, Value};

use peerdeck_pipeline::BatchSnapshot;

/// Filter and annotate a batch for one user.
///
/// Admins and `view_all_downloads` holders see everything with an accurate
/// `ownedByMe` flag; everyone else sees exactly their own items, each
/// flagged `ownedByMe: true`.
#[must_use]
pub fn items_for_user(
    items: &[UnifiedItem],
    user: &AuthedUser,
    owners: &HashMap<String, i64>,
) -> Vec<UnifiedItem> {
    let user_id = user.user_id;
    if user.sees_all_items() {
        return items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                let owner = owners.get(&item.key().to_string()).copied();
                item.owned_by_me = Some(match (owner, user_id) {
                    (Some(owner), Some(user_id)) => owner == user_id,
                    // Auth-disabled admins own the world.
                    (_, None) => true,
                    (None, Some(_)) => false,
                });
                item
            })
            .collect();
    }

    let Some(user_id) = user_id else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| owners.get(&item.key().to_string()) == Some(&user_id))
        .map(|item| {
            let mut item = item.clone();
            item.owned_by_me = Some(true);
            item
        })
        .collect()
}

/// Render the `batch-update` message for one user.
#[must_use]
pub fn batch_update_message(
    snapshot: &BatchSnapshot,
    user: &AuthedUser,
    owners: &HashMap<String, i64>,
) -> Value {
    json!({
        "type": "batch-update",
        "items": items_for_user(&snapshot.items, user, owners),
        "timestamp": snapshot.generated_at,
    })
}
