//! WebSocket action dispatch.
//!
//! Requests carry `{action, ...params}`. Before dispatch the hub
//! auto-reconnects enabled ed2k instances and checks the action's required
//! capabilities. Batch mutations are bounded at 1000 items, enforce
//! per-item ownership, collect per-item outcomes, and trigger exactly one
//! rebroadcast.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use peerdeck_auth::AuthedUser;
use peerdeck_categories::{Category, CategoryUpdate};
use peerdeck_core::{
    AddOptions, ClientKind, DeleteRequest, SearchQuery, UnifiedItem, UnifiedPriority,
};
use peerdeck_events::Event;
use peerdeck_fsops::{delete_probe_code, move_probe_code, DeleteProbe, MoveProbe, QueueMoveRequest};

use crate::state::SharedContext;

/// Upper bound on batch mutation size.
const BATCH_LIMIT: usize = 1000;

/// Pause between an on-disk shared delete and the follow-up broadcast, so
/// the daemon's rescan settles first.
const SHARED_DELETE_SETTLE: Duration = Duration::from_millis(500);

fn error_reply(message: &str) -> Vec<Value> {
    vec![json!({ "type": "error", "message": message })]
}

/// Dispatch one inbound message to its handler, returning the replies for
/// this connection (broadcasts travel through the hub's fan-out channel).
pub async fn dispatch(ctx: &SharedContext, user: &AuthedUser, msg: Value) -> Vec<Value> {
    let Some(action) = msg["action"].as_str().map(str::to_string) else {
        return error_reply("missing action");
    };

    ctx.autoconnect_ed2k().await;

    if !user.can_invoke(&action) {
        return error_reply("Insufficient permissions");
    }

    match action.as_str() {
        "search" => search(ctx, &msg).await,
        "refreshSharedFiles" => refresh_shared_files(ctx).await,
        "getServersList" => get_servers_list(ctx).await,
        "serverDoAction" => server_do_action(ctx, &msg).await,
        "getServerInfo" => get_server_info(ctx).await,
        "getStatsTree" => get_stats_tree(ctx).await,
        "getLog" => get_log(ctx).await,
        "getAppLog" => get_app_log(ctx).await,
        "getHistory" => get_history(ctx, user).await,
        "clearHistory" => clear_history(ctx).await,
        "addEd2kLinks" => add_ed2k_links(ctx, user, &msg).await,
        "addMagnetLinks" => add_magnet_links(ctx, user, &msg).await,
        "addTorrentFile" => add_torrent_file(ctx, user, &msg).await,
        "batchDownloadSearchResults" => batch_download_search_results(ctx, user, &msg).await,
        "getCategories" => get_categories(ctx).await,
        "createCategory" => create_category(ctx, &msg).await,
        "updateCategory" => update_category(ctx, &msg).await,
        "renameCategory" => rename_category(ctx, &msg).await,
        "deleteCategory" => delete_category(ctx, &msg).await,
        "batchPause" | "batchResume" | "batchStop" => batch_transfer_op(ctx, user, &msg, &action).await,
        "batchDelete" => batch_delete(ctx, user, &msg).await,
        "batchSetFileCategory" => batch_set_file_category(ctx, user, &msg).await,
        "checkDeletePermissions" => check_delete_permissions(ctx, user, &msg).await,
        "checkMovePermissions" => check_move_permissions(ctx, &msg).await,
        _ => error_reply(&format!("unknown action '{action}'")),
    }
}

struct BatchItemRef {
    hash: String,
    instance_id: String,
}

fn parse_batch_items(msg: &Value) -> Result<Vec<BatchItemRef>, &'static str> {
    let Some(raw) = msg["items"].as_array() else {
        return Err("missing items");
    };
    if raw.len() > BATCH_LIMIT {
        return Err("too many items in one batch (limit 1000)");
    }
    Ok(raw
        .iter()
        .filter_map(|entry| {
            let hash = entry["fileHash"].as_str()?.to_ascii_lowercase();
            let instance_id = entry["instanceId"].as_str()?.to_string();
            Some(BatchItemRef { hash, instance_id })
        })
        .collect())
}

async fn latest_item(ctx: &SharedContext, item: &BatchItemRef) -> Option<UnifiedItem> {
    let snapshot = ctx.service.latest_batch().await?;
    snapshot
        .items
        .iter()
        .find(|candidate| {
            candidate.instance_id == item.instance_id && candidate.hash == item.hash
        })
        .cloned()
}

async fn search(ctx: &SharedContext, msg: &Value) -> Vec<Value> {
    let Some(text) = msg["query"].as_str().filter(|query| !query.is_empty()) else {
        return error_reply("missing query");
    };
    let Some((_, client)) = ctx.ed2k_instance().await else {
        return error_reply("no connected ed2k instance");
    };
    if !ctx.try_lock_search() {
        return error_reply("a search is already running");
    }
    let query = SearchQuery {
        text: text.to_string(),
        file_type: msg["fileType"].as_str().map(str::to_string),
        min_size: msg["minSize"].as_u64(),
        max_size: msg["maxSize"].as_u64(),
    };
    let outcome = client.adapter.search(&query).await;
    ctx.unlock_search();
    match outcome {
        Ok(results) => vec![json!({ "type": "search-results", "results": results })],
        Err(err) => {
            warn!(error = %err, "search failed");
            error_reply("search failed")
        }
    }
}

async fn refresh_shared_files(ctx: &SharedContext) -> Vec<Value> {
    for (instance_id, client) in ctx.registry.get_by_kind(ClientKind::Amule).await {
        if client.adapter.is_connected() {
            if let Err(err) = client.adapter.refresh_shared_files().await {
                warn!(instance = %instance_id, error = %err, "shared refresh failed");
            }
        }
    }
    ctx.service.refresh_and_broadcast().await;
    vec![json!({ "type": "shared-files-refreshed" })]
}

async fn get_servers_list(ctx: &SharedContext) -> Vec<Value> {
    let Some((_, client)) = ctx.ed2k_instance().await else {
        return error_reply("no connected ed2k instance");
    };
    match client.adapter.get_servers().await {
        Ok(servers) => vec![json!({ "type": "servers-update", "servers": servers })],
        Err(err) => {
            warn!(error = %err, "server list fetch failed");
            error_reply("server list unavailable")
        }
    }
}

async fn server_do_action(ctx: &SharedContext, msg: &Value) -> Vec<Value> {
    let (Some(server_action), Some(address)) =
        (msg["serverAction"].as_str(), msg["address"].as_str())
    else {
        return error_reply("missing serverAction or address");
    };
    let Some((_, client)) = ctx.ed2k_instance().await else {
        return error_reply("no connected ed2k instance");
    };
    let success = match client.adapter.server_action(server_action, address).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "server action failed");
            false
        }
    };
    vec![json!({ "type": "server-action", "success": success })]
}

async fn get_server_info(ctx: &SharedContext) -> Vec<Value> {
    let Some((instance_id, client)) = ctx.ed2k_instance().await else {
        return error_reply("no connected ed2k instance");
    };
    match client.adapter.get_stats().await {
        Ok(raw) => {
            let network = client.adapter.network_status(&raw);
            vec![json!({
                "type": "server-info-update",
                "instanceId": instance_id,
                "stats": raw,
                "network": network,
            })]
        }
        Err(err) => {
            warn!(error = %err, "server info fetch failed");
            error_reply("server info unavailable")
        }
    }
}

async fn get_stats_tree(ctx: &SharedContext) -> Vec<Value> {
    let mut instances = Vec::new();
    for (instance_id, client) in ctx.registry.get_connected().await {
        match client.adapter.get_stats().await {
            Ok(raw) => {
                let metrics = client.adapter.extract_metrics(&raw);
                let network = client.adapter.network_status(&raw);
                instances.push(json!({
                    "instanceId": instance_id,
                    "displayName": client.display_name,
                    "client": client.kind,
                    "metrics": metrics,
                    "network": network,
                }));
            }
            Err(err) => {
                warn!(instance = %instance_id, error = %err, "stats fetch failed");
            }
        }
    }
    vec![json!({ "type": "stats-tree-update", "instances": instances })]
}

async fn get_log(ctx: &SharedContext) -> Vec<Value> {
    let Some((_, client)) = ctx.ed2k_instance().await else {
        return error_reply("no connected ed2k instance");
    };
    match client.adapter.get_log().await {
        Ok(log) => vec![json!({ "type": "log-update", "source": "client", "log": log })],
        Err(err) => {
            warn!(error = %err, "log fetch failed");
            error_reply("log unavailable")
        }
    }
}

async fn get_app_log(ctx: &SharedContext) -> Vec<Value> {
    let logs_dir = ctx.data_dir.join("logs");
    let log = tokio::task::spawn_blocking(move || read_newest_log(&logs_dir))
        .await
        .unwrap_or_default();
    vec![json!({ "type": "log-update", "source": "app", "log": log })]
}

fn read_newest_log(dir: &std::path::Path) -> String {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return String::new();
    };
    let newest = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .max_by_key(|entry| {
            entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
    newest
        .and_then(|entry| std::fs::read_to_string(entry.path()).ok())
        .map(|content| {
            // Tail the last chunk so huge logs stay cheap to ship.
            let tail_start = content.len().saturating_sub(64 * 1024);
            content[tail_start..].to_string()
        })
        .unwrap_or_default()
}

async fn get_history(ctx: &SharedContext, user: &AuthedUser) -> Vec<Value> {
    let filter = if user.sees_all_items() {
        None
    } else {
        user.user_id
    };
    match ctx.data.history.list(500, filter).await {
        Ok(entries) => vec![json!({ "type": "history-update", "entries": entries })],
        Err(err) => {
            warn!(error = %err, "history list failed");
            error_reply("history unavailable")
        }
    }
}

async fn clear_history(ctx: &SharedContext) -> Vec<Value> {
    match ctx.data.history.clear().await {
        Ok(removed) => {
            info!(removed, "history cleared");
            vec![json!({ "type": "history-update", "entries": [] })]
        }
        Err(err) => {
            warn!(error = %err, "history clear failed");
            error_reply("history clear failed")
        }
    }
}

/// Resolve (creating when missing) the category named in an add request.
/// Newly created categories propagate to every capable client and announce
/// themselves with a `categories-update`.
async fn ensure_add_category(
    ctx: &SharedContext,
    label: Option<&str>,
    replies: &mut Vec<Value>,
) -> Option<String> {
    let label = label?.trim();
    if label.is_empty() {
        return None;
    }
    if ctx.categories.get(label).await.is_none() {
        match ctx
            .categories
            .create(Category {
                name: label.to_string(),
                ..Category::default()
            })
            .await
        {
            Ok(_) => {
                replies.push(json!({
                    "type": "categories-update",
                    "categories": ctx.categories.list().await,
                }));
            }
            Err(err) => {
                warn!(category = label, error = %err, "category auto-create failed");
            }
        }
    }
    Some(label.to_string())
}

async fn add_ed2k_links(ctx: &SharedContext, user: &AuthedUser, msg: &Value) -> Vec<Value> {
    let Some(links) = msg["links"].as_array() else {
        return error_reply("missing links");
    };
    let Some((instance_id, client)) = ctx.ed2k_instance().await else {
        return error_reply("no connected ed2k instance");
    };

    let mut replies = Vec::new();
    let category = ensure_add_category(ctx, msg["label"].as_str(), &mut replies).await;
    let category_id = match &category {
        Some(name) => match client.adapter.ensure_amule_category_id(name).await {
            Ok(id) => {
                let _ = ctx
                    .categories
                    .link_amule_id(name, &instance_id, id)
                    .await;
                Some(id)
            }
            Err(err) => {
                warn!(error = %err, "category id resolution failed");
                None
            }
        },
        None => None,
    };

    let mut results = Vec::new();
    for link in links.iter().filter_map(Value::as_str) {
        match client.adapter.add_ed2k_link(link, category_id).await {
            Ok(hash) => {
                let key = format!("{instance_id}:{}", hash.to_ascii_lowercase());
                ctx.record_ownership(user, &key).await;
                ctx.events.publish(Event::DownloadAdded {
                    compound_key: key,
                    name: None,
                    user_id: user.user_id,
                });
                results.push(json!({ "link": link, "success": true }));
            }
            Err(err) => {
                results.push(json!({ "link": link, "success": false, "error": err.to_string() }));
            }
        }
    }

    ctx.service.refresh_and_broadcast().await;
    replies.push(json!({ "type": "ed2k-added", "results": results }));
    replies
}

async fn add_magnet_links(ctx: &SharedContext, user: &AuthedUser, msg: &Value) -> Vec<Value> {
    let Some(links) = msg["links"].as_array() else {
        return error_reply("missing links");
    };
    let target = {
        let mut found = None;
        for kind in [ClientKind::QBittorrent, ClientKind::RTorrent] {
            if let Some(client) = ctx
                .registry
                .get_by_kind(kind)
                .await
                .into_iter()
                .find(|(_, client)| client.adapter.is_connected())
            {
                found = Some(client);
                break;
            }
        }
        found
    };
    let Some((instance_id, client)) = target else {
        return error_reply("no connected BitTorrent instance");
    };

    let mut replies = Vec::new();
    let category = ensure_add_category(ctx, msg["label"].as_str(), &mut replies).await;
    let opts = AddOptions {
        category,
        ..AddOptions::default()
    };

    let mut results = Vec::new();
    for link in links.iter().filter_map(Value::as_str) {
        match client.adapter.add_magnet(link, &opts).await {
            Ok(hash) if !hash.is_empty() => {
                let key = format!("{instance_id}:{hash}");
                ctx.record_ownership(user, &key).await;
                ctx.events.publish(Event::DownloadAdded {
                    compound_key: key,
                    name: None,
                    user_id: user.user_id,
                });
                results.push(json!({ "link": link, "success": true }));
            }
            Ok(_) => {
                results.push(json!({ "link": link, "success": true }));
            }
            Err(err) => {
                results.push(json!({ "link": link, "success": false, "error": err.to_string() }));
            }
        }
    }

    ctx.service.refresh_and_broadcast().await;
    replies.push(json!({ "type": "magnet-added", "results": results }));
    replies
}

async fn add_torrent_file(ctx: &SharedContext, user: &AuthedUser, msg: &Value) -> Vec<Value> {
    let Some(content) = msg["content"].as_str() else {
        return error_reply("missing content");
    };
    let Ok(bytes) = BASE64.decode(content) else {
        return error_reply("content is not valid base64");
    };
    let target = ctx
        .registry
        .get_by_kind(ClientKind::QBittorrent)
        .await
        .into_iter()
        .find(|(_, client)| client.adapter.is_connected());
    let Some((instance_id, client)) = target else {
        return error_reply("no connected BitTorrent instance");
    };

    let mut replies = Vec::new();
    let category = ensure_add_category(ctx, msg["label"].as_str(), &mut replies).await;
    let opts = AddOptions {
        category,
        ..AddOptions::default()
    };

    match client.adapter.add_torrent_raw(&bytes, &opts).await {
        Ok(hash) => {
            if !hash.is_empty() {
                let key = format!("{instance_id}:{hash}");
                ctx.record_ownership(user, &key).await;
            }
            ctx.service.refresh_and_broadcast().await;
            replies.push(json!({ "type": "torrent-added", "success": true }));
        }
        Err(err) => {
            replies.push(json!({
                "type": "torrent-added",
                "success": false,
                "error": err.to_string(),
            }));
        }
    }
    replies
}

async fn batch_download_search_results(
    ctx: &SharedContext,
    user: &AuthedUser,
    msg: &Value,
) -> Vec<Value> {
    let Some(entries) = msg["items"].as_array() else {
        return error_reply("missing items");
    };
    if entries.len() > BATCH_LIMIT {
        return error_reply("too many items in one batch (limit 1000)");
    }
    let Some((instance_id, client)) = ctx.ed2k_instance().await else {
        return error_reply("no connected ed2k instance");
    };
    let category_id = msg["categoryId"].as_u64().and_then(|id| u32::try_from(id).ok());

    let mut results = Vec::new();
    for entry in entries {
        let Some(hash) = entry["fileHash"].as_str() else {
            continue;
        };
        match client.adapter.add_search_result(hash, category_id).await {
            Ok(()) => {
                let key = format!("{instance_id}:{}", hash.to_ascii_lowercase());
                ctx.record_ownership(user, &key).await;
                ctx.events.publish(Event::DownloadAdded {
                    compound_key: key,
                    name: entry["fileName"].as_str().map(str::to_string),
                    user_id: user.user_id,
                });
                results.push(json!({ "fileHash": hash, "success": true }));
            }
            Err(err) => {
                results.push(json!({
                    "fileHash": hash,
                    "success": false,
                    "error": err.to_string(),
                }));
            }
        }
    }

    ctx.service.refresh_and_broadcast().await;
    vec![json!({ "type": "batch-download-complete", "results": results })]
}

async fn get_categories(ctx: &SharedContext) -> Vec<Value> {
    vec![json!({
        "type": "categories-update",
        "categories": ctx.categories.list().await,
    })]
}

fn category_from_msg(msg: &Value) -> Category {
    let mut category = Category {
        name: msg["name"].as_str().unwrap_or_default().to_string(),
        ..Category::default()
    };
    if let Some(color) = msg["color"].as_str() {
        category.color = color.to_string();
    }
    if let Some(path) = msg["path"].as_str() {
        category.path = Some(path.to_string());
    }
    if let Some(comment) = msg["comment"].as_str() {
        category.comment = comment.to_string();
    }
    if let Some(priority) = msg["priority"].as_u64() {
        if let Some(priority) = UnifiedPriority::from_code(priority as u8) {
            category.priority = priority;
        }
    }
    if let Some(mappings) = msg["pathMappings"].as_object() {
        for (key, value) in mappings {
            if let Some(path) = value.as_str() {
                category
                    .path_mappings
                    .insert(key.clone(), path.to_string());
            }
        }
    }
    category
}

async fn create_category(ctx: &SharedContext, msg: &Value) -> Vec<Value> {
    let category = category_from_msg(msg);
    if category.name.is_empty() {
        return error_reply("missing name");
    }
    match ctx.categories.create(category).await {
        Ok(created) => vec![
            json!({ "type": "category-created", "category": created }),
            json!({ "type": "categories-update", "categories": ctx.categories.list().await }),
        ],
        Err(err) => error_reply(&err.to_string()),
    }
}

async fn update_category(ctx: &SharedContext, msg: &Value) -> Vec<Value> {
    let Some(name) = msg["name"].as_str() else {
        return error_reply("missing name");
    };
    let update = CategoryUpdate {
        color: msg["color"].as_str().map(str::to_string),
        path: msg.get("path").map(|path| path.as_str().map(str::to_string)),
        path_mappings: msg["pathMappings"].as_object().map(|mappings| {
            mappings
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|path| (key.clone(), path.to_string()))
                })
                .collect()
        }),
        comment: msg["comment"].as_str().map(str::to_string),
        priority: msg["priority"]
            .as_u64()
            .and_then(|code| UnifiedPriority::from_code(code as u8)),
    };
    match ctx.categories.update(name, update).await {
        Ok((updated, mismatches)) => {
            let mut reply = json!({ "type": "category-updated", "category": updated });
            if !mismatches.is_empty() {
                reply["mismatches"] = json!(mismatches);
            }
            vec![
                reply,
                json!({ "type": "categories-update", "categories": ctx.categories.list().await }),
            ]
        }
        Err(err) => error_reply(&err.to_string()),
    }
}

async fn rename_category(ctx: &SharedContext, msg: &Value) -> Vec<Value> {
    let (Some(old_name), Some(new_name)) = (msg["oldName"].as_str(), msg["newName"].as_str())
    else {
        return error_reply("missing oldName or newName");
    };
    match ctx.categories.rename(old_name, new_name).await {
        Ok(renamed) => vec![
            json!({ "type": "category-updated", "category": renamed }),
            json!({ "type": "categories-update", "categories": ctx.categories.list().await }),
        ],
        Err(err) => error_reply(&err.to_string()),
    }
}

async fn delete_category(ctx: &SharedContext, msg: &Value) -> Vec<Value> {
    let Some(name) = msg["name"].as_str() else {
        return error_reply("missing name");
    };
    match ctx.categories.delete(name).await {
        Ok(()) => vec![
            json!({ "type": "category-deleted", "name": name }),
            json!({ "type": "categories-update", "categories": ctx.categories.list().await }),
        ],
        Err(err) => error_reply(&err.to_string()),
    }
}

async fn batch_transfer_op(
    ctx: &SharedContext,
    user: &AuthedUser,
    msg: &Value,
    action: &str,
) -> Vec<Value> {
    let items = match parse_batch_items(msg) {
        Ok(items) => items,
        Err(message) => return error_reply(message),
    };

    let mut results = Vec::new();
    for item in &items {
        let key = format!("{}:{}", item.instance_id, item.hash);
        if !ctx.may_mutate(user, &key).await {
            results.push(json!({ "fileHash": item.hash, "success": false, "denied": true }));
            continue;
        }
        let Some(client) = ctx.registry.get(&item.instance_id).await else {
            results.push(json!({
                "fileHash": item.hash,
                "success": false,
                "error": "unknown instance",
            }));
            continue;
        };
        let outcome = match action {
            "batchPause" => client.adapter.pause(&item.hash).await,
            "batchResume" => client.adapter.resume(&item.hash).await,
            _ => client.adapter.stop(&item.hash).await,
        };
        match outcome {
            Ok(()) => results.push(json!({ "fileHash": item.hash, "success": true })),
            Err(err) => results.push(json!({
                "fileHash": item.hash,
                "success": false,
                "error": err.to_string(),
            })),
        }
    }

    ctx.service.refresh_and_broadcast().await;
    vec![json!({
        "type": format!("{action}-complete"),
        "results": results,
        "message": format!("{} of {} items processed", succeeded(&results), results.len()),
    })]
}

fn succeeded(results: &[Value]) -> usize {
    results
        .iter()
        .filter(|result| result["success"].as_bool() == Some(true))
        .count()
}

async fn batch_delete(ctx: &SharedContext, user: &AuthedUser, msg: &Value) -> Vec<Value> {
    let items = match parse_batch_items(msg) {
        Ok(items) => items,
        Err(message) => return error_reply(message),
    };
    let delete_files = msg["deleteFiles"].as_bool().unwrap_or(false);

    let mut results = Vec::new();
    let mut refreshed_shared = false;
    for item in &items {
        let key = format!("{}:{}", item.instance_id, item.hash);
        if !ctx.may_mutate(user, &key).await {
            results.push(json!({ "fileHash": item.hash, "success": false, "denied": true }));
            continue;
        }
        let Some(client) = ctx.registry.get(&item.instance_id).await else {
            results.push(json!({
                "fileHash": item.hash,
                "success": false,
                "error": "unknown instance",
            }));
            continue;
        };
        let flags = &client.kind.meta().flags;
        let current = latest_item(ctx, item).await;
        let is_shared = current
            .as_ref()
            .is_some_and(|item| item.shared && !item.downloading);

        let request = DeleteRequest {
            delete_files,
            is_shared,
            file_path: None,
        };
        match client.adapter.delete_item(&item.hash, &request).await {
            Ok(outcome) if outcome.success => {
                let mut deleted_from_disk = delete_files && flags.api_deletes_files;
                for remote_path in &outcome.paths_to_delete {
                    let local = ctx
                        .categories
                        .translate_path(remote_path, client.kind.as_str(), &item.instance_id)
                        .await;
                    match tokio::fs::remove_file(&local).await {
                        Ok(()) => deleted_from_disk = true,
                        Err(err) => {
                            warn!(path = %local, error = %err, "payload delete failed");
                        }
                    }
                }
                if !outcome.paths_to_delete.is_empty() && flags.refresh_shared_after_delete {
                    if let Err(err) = client.adapter.refresh_shared_files().await {
                        warn!(error = %err, "post-delete shared refresh failed");
                    }
                    refreshed_shared = true;
                }
                ctx.events.publish(Event::FileDeleted {
                    compound_key: key.clone(),
                    deleted_from_disk,
                });
                if let Err(err) = ctx.data.ownership.remove(&key).await {
                    warn!(error = %err, "ownership cleanup failed");
                }
                results.push(json!({ "fileHash": item.hash, "success": true }));
            }
            Ok(_) => {
                results.push(json!({
                    "fileHash": item.hash,
                    "success": false,
                    "error": "client refused the delete",
                }));
            }
            Err(err) => {
                results.push(json!({
                    "fileHash": item.hash,
                    "success": false,
                    "error": err.to_string(),
                }));
            }
        }
    }

    if refreshed_shared {
        // Give the daemon's rescan a moment before observers re-pull.
        sleep(SHARED_DELETE_SETTLE).await;
    }
    ctx.service.refresh_and_broadcast().await;
    vec![json!({
        "type": "batchDelete-complete",
        "results": results,
        "message": format!("{} of {} items deleted", succeeded(&results), results.len()),
    })]
}

async fn batch_set_file_category(
    ctx: &SharedContext,
    user: &AuthedUser,
    msg: &Value,
) -> Vec<Value> {
    let items = match parse_batch_items(msg) {
        Ok(items) => items,
        Err(message) => return error_reply(message),
    };
    let Some(category_name) = msg["category"].as_str() else {
        return error_reply("missing category");
    };
    let priority = msg["priority"]
        .as_u64()
        .and_then(|code| UnifiedPriority::from_code(code as u8));

    let mut results = Vec::new();
    for item in &items {
        let key = format!("{}:{}", item.instance_id, item.hash);
        if !ctx.may_mutate(user, &key).await {
            results.push(json!({ "fileHash": item.hash, "success": false, "denied": true }));
            continue;
        }
        let Some(client) = ctx.registry.get(&item.instance_id).await else {
            results.push(json!({
                "fileHash": item.hash,
                "success": false,
                "error": "unknown instance",
            }));
            continue;
        };
        match client
            .adapter
            .set_category(&item.hash, category_name, priority)
            .await
        {
            Ok(()) => {
                results.push(json!({ "fileHash": item.hash, "success": true }));
                maybe_queue_category_move(ctx, user, item, category_name, &client).await;
            }
            Err(err) => {
                results.push(json!({
                    "fileHash": item.hash,
                    "success": false,
                    "error": err.to_string(),
                }));
            }
        }
    }

    ctx.service.refresh_and_broadcast().await;
    vec![json!({
        "type": "batchSetFileCategory-complete",
        "results": results,
        "message": format!("{} of {} items updated", succeeded(&results), results.len()),
    })]
}

/// Complete items on clients that do not relocate on category change get a
/// queued move to the category destination (when the caller may move files
/// and both paths resolve).
async fn maybe_queue_category_move(
    ctx: &SharedContext,
    user: &AuthedUser,
    item: &BatchItemRef,
    category_name: &str,
    client: &peerdeck_core::RegisteredClient,
) {
    let flags = &client.kind.meta().flags;
    if flags.category_change_auto_moves {
        return;
    }
    if !user.has_capability(peerdeck_auth::Capability::MoveFiles) {
        return;
    }
    let Some(current) = latest_item(
        ctx,
        &BatchItemRef {
            hash: item.hash.clone(),
            instance_id: item.instance_id.clone(),
        },
    )
    .await
    else {
        return;
    };
    if !current.complete {
        return;
    }
    let Some(source_remote) = item_source_path(&current) else {
        return;
    };
    let Some(dest) = ctx
        .moves
        .resolve_dest_paths(
            category_name,
            &item.instance_id,
            client.kind.as_str(),
            flags.native_move,
        )
        .await
    else {
        return;
    };
    let file_name = current.name.clone();
    let request = QueueMoveRequest {
        compound_key: peerdeck_core::CompoundKey::new(item.instance_id.clone(), &item.hash),
        name: file_name.clone(),
        source_path_remote: source_remote,
        dest_path_local: format!("{}/{file_name}", dest.local.trim_end_matches('/')),
        dest_path_remote: dest.remote,
        total_size: current.size,
        is_multi_file: client.kind.meta().flags.multi_file,
        category_name: category_name.to_string(),
    };
    if let Err(err) = ctx.moves.queue_move(request).await {
        warn!(error = %err, "category move queue failed");
    }
}

fn item_source_path(item: &UnifiedItem) -> Option<String> {
    if let Some(extras) = &item.torrent {
        if let Some(save_path) = &extras.save_path {
            return Some(format!("{}/{}", save_path.trim_end_matches('/'), item.name));
        }
    }
    item.raw
        .get("path")
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn check_delete_permissions(
    ctx: &SharedContext,
    user: &AuthedUser,
    msg: &Value,
) -> Vec<Value> {
    let items = match parse_batch_items(msg) {
        Ok(items) => items,
        Err(message) => return error_reply(message),
    };

    let mut results = Vec::new();
    for item in &items {
        let key = format!("{}:{}", item.instance_id, item.hash);
        let current = latest_item(ctx, item).await;
        let client = ctx.registry.get(&item.instance_id).await;
        let visible = user.sees_all_items() || ctx.may_mutate(user, &key).await;
        let local_path = match &current {
            Some(current) => match item_source_path(current) {
                Some(remote) => Some(
                    ctx.categories
                        .translate_path(
                            &remote,
                            client
                                .as_ref()
                                .map(|client| client.kind.as_str())
                                .unwrap_or_default(),
                            &item.instance_id,
                        )
                        .await,
                ),
                None => None,
            },
            None => None,
        };
        let probe = DeleteProbe {
            item_found: current.is_some() && client.is_some(),
            visible,
            may_edit: ctx.may_mutate(user, &key).await,
            client_deletes_files: client
                .as_ref()
                .is_some_and(|client| client.kind.meta().flags.api_deletes_files),
            local_path,
        };
        let code = delete_probe_code(&probe);
        results.push(json!({ "fileHash": item.hash, "code": code }));
    }
    vec![json!({ "type": "delete-permissions", "results": results })]
}

async fn check_move_permissions(ctx: &SharedContext, msg: &Value) -> Vec<Value> {
    let items = match parse_batch_items(msg) {
        Ok(items) => items,
        Err(message) => return error_reply(message),
    };
    let category_override = msg["category"].as_str();

    let mut results = Vec::new();
    for item in &items {
        let current = latest_item(ctx, item).await;
        let client = ctx.registry.get(&item.instance_id).await;
        let kind_label = client
            .as_ref()
            .map(|client| client.kind.as_str())
            .unwrap_or_default();
        let source_path = match &current {
            Some(current) => match item_source_path(current) {
                Some(remote) => Some(
                    ctx.categories
                        .translate_path(&remote, kind_label, &item.instance_id)
                        .await,
                ),
                None => None,
            },
            None => None,
        };
        let dest_path = match (&current, &client) {
            (Some(current), Some(client)) => {
                let category = category_override.unwrap_or(current.category.as_str());
                ctx.moves
                    .resolve_dest_paths(
                        category,
                        &item.instance_id,
                        client.kind.as_str(),
                        client.kind.meta().flags.native_move,
                    )
                    .await
                    .map(|dest| dest.local)
            }
            _ => None,
        };
        let probe = MoveProbe {
            item_found: current.is_some() && client.is_some(),
            source_path,
            dest_path,
        };
        let code = move_probe_code(&probe);
        results.push(json!({ "fileHash": item.hash, "code": code }));
    }
    vec![json!({ "type": "move-permissions", "results": results })]
}
