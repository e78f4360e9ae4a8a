//! qBittorrent compatibility façade (`/api/v2`).
//!
//! Exposes the ed2k backend to third-party automation speaking the
//! qBittorrent WebUI protocol. ed2k downloads are synthesized into the
//! torrent vocabulary: a stable 40-hex hash from the persisted bi-map and a
//! state string derived from the unified status.

use std::collections::HashMap;

use axum::extract::{Form, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use peerdeck_core::{ItemStatus, UnifiedItem};

use crate::error::ApiError;
use crate::state::SharedContext;

const COMPAT_COOKIE: &str = "SID";

/// ETA cap applied when speed is zero or the item is complete.
const ETA_CAP: i64 = 8_640_000;

/// Attach the compatibility endpoints to the primary router.
#[must_use]
pub(crate) fn mount(router: Router<SharedContext>) -> Router<SharedContext> {
    router
        .route("/api/v2/auth/login", post(login))
        .route("/api/v2/auth/logout", post(logout))
        .route("/api/v2/app/version", get(app_version))
        .route("/api/v2/app/webapiVersion", get(app_webapi_version))
        .route("/api/v2/app/preferences", get(app_preferences))
        .route("/api/v2/torrents/info", get(torrents_info))
        .route("/api/v2/torrents/add", post(torrents_add))
        .route("/api/v2/torrents/delete", post(torrents_delete))
        .route("/api/v2/torrents/pause", post(torrents_pause))
        .route("/api/v2/torrents/resume", post(torrents_resume))
        .route("/api/v2/torrents/categories", get(list_categories))
        .route("/api/v2/torrents/createCategory", post(create_category))
}

/// Derive the qBittorrent state string for an ed2k item.
#[must_use]
pub(crate) fn qb_state(item: &UnifiedItem) -> &'static str {
    match item.status {
        ItemStatus::Moving => "moving",
        ItemStatus::Error | ItemStatus::Unknown => "error",
        ItemStatus::Checking => "checkingDL",
        ItemStatus::Queued => "queuedDL",
        ItemStatus::Paused => {
            if item.complete {
                "pausedUP"
            } else {
                "pausedDL"
            }
        }
        ItemStatus::Stopped => {
            if item.complete {
                "pausedUP"
            } else {
                "pausedDL"
            }
        }
        ItemStatus::Seeding => {
            if item.upload_speed > 0 {
                "uploading"
            } else {
                "stalledUP"
            }
        }
        ItemStatus::Active => {
            if item.size == 0 {
                "metaDL"
            } else if item.download_speed > 0 {
                "downloading"
            } else if item.sources.connected == 0 {
                "stalledDL"
            } else {
                "queuedDL"
            }
        }
    }
}

/// ETA in seconds, capped per the protocol contract.
#[must_use]
pub(crate) fn qb_eta(item: &UnifiedItem) -> i64 {
    if item.complete || item.download_speed == 0 {
        return ETA_CAP;
    }
    item.eta
        .map_or(ETA_CAP, |eta| i64::try_from(eta).unwrap_or(ETA_CAP).min(ETA_CAP))
}

#[derive(Serialize)]
pub(crate) struct QbTorrentEntry {
    added_on: i64,
    category: String,
    dlspeed: i64,
    upspeed: i64,
    downloaded: i64,
    uploaded: i64,
    size: i64,
    progress: f64,
    state: &'static str,
    name: String,
    hash: String,
    save_path: String,
    eta: i64,
    ratio: f64,
    num_seeds: i64,
    num_complete: i64,
}

async fn qb_entry(ctx: &SharedContext, item: &UnifiedItem) -> QbTorrentEntry {
    let hash = ctx
        .data
        .hashes
        .torrent_hash_for(&item.hash)
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, "synthetic hash store failure");
            peerdeck_data::hashes::derive_torrent_hash(&item.hash)
        });
    QbTorrentEntry {
        added_on: item.added_at.map_or(0, |at| at.timestamp()),
        category: item.category.clone(),
        dlspeed: item.download_speed.min(i64::MAX as u64) as i64,
        upspeed: item.upload_speed.min(i64::MAX as u64) as i64,
        downloaded: item.size_downloaded.min(i64::MAX as u64) as i64,
        uploaded: item.upload_total.min(i64::MAX as u64) as i64,
        size: item.size.min(i64::MAX as u64) as i64,
        progress: item.progress,
        state: qb_state(item),
        name: item.name.clone(),
        hash,
        save_path: item
            .raw
            .get("path")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string(),
        eta: qb_eta(item),
        ratio: item.ratio,
        num_seeds: i64::from(item.sources.connected),
        num_complete: i64::from(item.sources.seeders),
    }
}

fn compat_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    for part in cookie::Cookie::split_parse(header.to_string()) {
        if let Ok(parsed) = part {
            if parsed.name() == COMPAT_COOKIE {
                return Some(parsed.value().to_string());
            }
        }
    }
    None
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Accept a live SID cookie, HTTP Basic admin credentials (password or API
/// key), or anything when authentication is disabled.
async fn ensure_session(ctx: &SharedContext, headers: &HeaderMap) -> Result<(), ApiError> {
    if !ctx.auth.auth_enabled() {
        return Ok(());
    }
    if let Some(sid) = compat_cookie(headers) {
        if ctx.compat_session_valid(&sid) {
            return Ok(());
        }
    }
    if let Some((username, password)) = basic_credentials(headers) {
        ctx.auth.verify_basic(&username, &password).await?;
        return Ok(());
    }
    Err(ApiError::unauthorized("missing or invalid session"))
}

fn ok_plain(body: &'static str) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[derive(Deserialize, Default)]
pub(crate) struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(ctx): State<SharedContext>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    if ctx.auth.auth_enabled() {
        ctx.auth.verify_basic(&form.username, &form.password).await
            .map_err(|_| ApiError::unauthorized("Fails."))?;
    }
    let sid = ctx.issue_compat_session();
    let mut response = ok_plain("Ok.");
    let cookie_value = format!("{COMPAT_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax");
    response.headers_mut().insert(
        SET_COOKIE,
        cookie_value
            .parse()
            .map_err(|_| ApiError::internal("cookie encoding failed"))?,
    );
    Ok(response)
}

async fn logout(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(sid) = compat_cookie(&headers) {
        ctx.revoke_compat_session(&sid);
    }
    Ok(ok_plain("Ok."))
}

async fn app_version(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    ensure_session(&ctx, &headers).await?;
    let mut response = (StatusCode::OK, format!("Peerdeck {}", ctx.app_version)).into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(response)
}

async fn app_webapi_version(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    ensure_session(&ctx, &headers).await?;
    Ok(ok_plain("2.8.3"))
}

async fn app_preferences(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_session(&ctx, &headers).await?;
    Ok(Json(json!({
        "save_path": "",
        "temp_path_enabled": false,
        "dht": false,
        "pex": false,
        "queueing_enabled": false,
        "max_active_downloads": -1,
        "max_active_torrents": -1,
    })))
}

async fn ed2k_items(ctx: &SharedContext) -> Vec<UnifiedItem> {
    let Some(snapshot) = ctx.service.cached_batch(15_000).await.or(ctx.service.latest_batch().await)
    else {
        return Vec::new();
    };
    snapshot
        .items
        .iter()
        .filter(|item| item.client == peerdeck_core::ClientKind::Amule)
        .cloned()
        .collect()
}

#[derive(Deserialize, Default)]
pub(crate) struct InfoParams {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    hashes: Option<String>,
}

async fn torrents_info(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Query(params): Query<InfoParams>,
) -> Result<Json<Vec<QbTorrentEntry>>, ApiError> {
    ensure_session(&ctx, &headers).await?;
    let items = ed2k_items(&ctx).await;
    let hash_filter: Option<Vec<String>> = params.hashes.as_deref().map(|hashes| {
        hashes
            .split('|')
            .map(|hash| hash.to_ascii_lowercase())
            .collect()
    });

    let mut entries = Vec::new();
    for item in &items {
        if let Some(category) = &params.category {
            if &item.category != category {
                continue;
            }
        }
        let entry = qb_entry(&ctx, item).await;
        if let Some(filter) = &hash_filter {
            let matches = filter.iter().any(|candidate| {
                candidate == "all" || candidate.eq_ignore_ascii_case(&entry.hash)
            });
            if !matches {
                continue;
            }
        }
        entries.push(entry);
    }
    Ok(Json(entries))
}

#[derive(Deserialize, Default)]
pub(crate) struct AddForm {
    #[serde(default)]
    urls: String,
    #[serde(default)]
    category: Option<String>,
}

async fn torrents_add(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Form(form): Form<AddForm>,
) -> Result<Response, ApiError> {
    ensure_session(&ctx, &headers).await?;
    let Some((_, client)) = ctx.ed2k_instance().await else {
        return Err(ApiError::internal("no connected ed2k instance"));
    };

    let category_id = match form.category.as_deref() {
        Some(name) if !name.is_empty() => client
            .adapter
            .ensure_amule_category_id(name)
            .await
            .ok(),
        _ => None,
    };

    let mut added = 0;
    for url in form.urls.lines().map(str::trim).filter(|url| !url.is_empty()) {
        if url.starts_with("ed2k://") {
            match client.adapter.add_ed2k_link(url, category_id).await {
                Ok(_) => added += 1,
                Err(err) => warn!(error = %err, "compat add failed"),
            }
        } else {
            warn!(url, "compat add ignored non-ed2k url");
        }
    }
    if added > 0 {
        ctx.service.refresh_and_broadcast().await;
    }
    Ok(ok_plain("Ok."))
}

/// Map a synthetic 40-hex hash list back to ed2k hashes.
async fn resolve_hashes(ctx: &SharedContext, raw: &str) -> Vec<String> {
    let mut resolved = Vec::new();
    for hash in raw.split('|').filter(|hash| !hash.is_empty()) {
        match ctx.data.hashes.ed2k_hash_for(hash).await {
            Ok(Some(ed2k)) => resolved.push(ed2k),
            Ok(None) => resolved.push(hash.to_ascii_lowercase()),
            Err(err) => warn!(error = %err, "hash reverse lookup failed"),
        }
    }
    resolved
}

#[derive(Deserialize, Default)]
pub(crate) struct HashesForm {
    #[serde(default)]
    hashes: String,
    #[serde(default, rename = "deleteFiles")]
    delete_files: Option<String>,
}

async fn torrents_delete(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Form(form): Form<HashesForm>,
) -> Result<Response, ApiError> {
    ensure_session(&ctx, &headers).await?;
    let Some((instance_id, client)) = ctx.ed2k_instance().await else {
        return Err(ApiError::internal("no connected ed2k instance"));
    };
    let delete_files = form
        .delete_files
        .as_deref()
        .is_some_and(|flag| flag.eq_ignore_ascii_case("true"));

    for hash in resolve_hashes(&ctx, &form.hashes).await {
        let request = peerdeck_core::DeleteRequest {
            delete_files,
            is_shared: false,
            file_path: None,
        };
        match client.adapter.delete_item(&hash, &request).await {
            Ok(_) => {
                let key = format!("{instance_id}:{hash}");
                if let Err(err) = ctx.data.ownership.remove(&key).await {
                    warn!(error = %err, "ownership cleanup failed");
                }
            }
            Err(err) => warn!(error = %err, "compat delete failed"),
        }
    }
    ctx.service.refresh_and_broadcast().await;
    Ok(ok_plain("Ok."))
}

async fn torrents_pause(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Form(form): Form<HashesForm>,
) -> Result<Response, ApiError> {
    ensure_session(&ctx, &headers).await?;
    let Some((_, client)) = ctx.ed2k_instance().await else {
        return Err(ApiError::internal("no connected ed2k instance"));
    };
    for hash in resolve_hashes(&ctx, &form.hashes).await {
        if let Err(err) = client.adapter.pause(&hash).await {
            warn!(error = %err, "compat pause failed");
        }
    }
    ctx.service.refresh_and_broadcast().await;
    Ok(ok_plain("Ok."))
}

async fn torrents_resume(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Form(form): Form<HashesForm>,
) -> Result<Response, ApiError> {
    ensure_session(&ctx, &headers).await?;
    let Some((_, client)) = ctx.ed2k_instance().await else {
        return Err(ApiError::internal("no connected ed2k instance"));
    };
    for hash in resolve_hashes(&ctx, &form.hashes).await {
        if let Err(err) = client.adapter.resume(&hash).await {
            warn!(error = %err, "compat resume failed");
        }
    }
    ctx.service.refresh_and_broadcast().await;
    Ok(ok_plain("Ok."))
}

#[derive(Serialize)]
struct QbCategory {
    name: String,
    #[serde(rename = "savePath")]
    save_path: String,
}

async fn list_categories(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, QbCategory>>, ApiError> {
    ensure_session(&ctx, &headers).await?;
    let categories = ctx.categories.list().await;
    Ok(Json(
        categories
            .into_iter()
            .map(|category| {
                (
                    category.name.clone(),
                    QbCategory {
                        name: category.name,
                        save_path: category.path.unwrap_or_default(),
                    },
                )
            })
            .collect(),
    ))
}

#[derive(Deserialize, Default)]
pub(crate) struct CreateCategoryForm {
    #[serde(default)]
    category: String,
    #[serde(default, rename = "savePath")]
    save_path: Option<String>,
}

async fn create_category(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Form(form): Form<CreateCategoryForm>,
) -> Result<Response, ApiError> {
    ensure_session(&ctx, &headers).await?;
    if form.category.is_empty() {
        return Err(ApiError::bad_request("missing category"));
    }
    let category = peerdeck_categories::Category {
        name: form.category,
        path: form.save_path.filter(|path| !path.is_empty()),
        ..peerdeck_categories::Category::default()
    };
    ctx.categories
        .create(category)
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(ok_plain("Ok."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerdeck_core::ClientKind;

    fn item(status: ItemStatus, progress: f64) -> UnifiedItem {
        let mut item = UnifiedItem::new(
            "amule-host-4712",
            ClientKind::Amule,
            "0123456789abcdef0123456789abcdef",
            "Film.iso",
        );
        item.size = 1_000;
        item.progress = progress;
        item.status = status;
        item.complete = progress >= 1.0;
        item
    }

    #[test]
    fn state_synthesis_covers_the_vocabulary() {
        assert_eq!(qb_state(&item(ItemStatus::Moving, 0.5)), "moving");
        assert_eq!(qb_state(&item(ItemStatus::Error, 0.5)), "error");
        assert_eq!(qb_state(&item(ItemStatus::Checking, 0.5)), "checkingDL");
        assert_eq!(qb_state(&item(ItemStatus::Queued, 0.5)), "queuedDL");
        assert_eq!(qb_state(&item(ItemStatus::Paused, 0.5)), "pausedDL");
        assert_eq!(qb_state(&item(ItemStatus::Paused, 1.0)), "pausedUP");

        let mut seeding = item(ItemStatus::Seeding, 1.0);
        assert_eq!(qb_state(&seeding), "stalledUP");
        seeding.upload_speed = 100;
        assert_eq!(qb_state(&seeding), "uploading");

        let mut active = item(ItemStatus::Active, 0.5);
        assert_eq!(active.sources.connected, 0);
        assert_eq!(qb_state(&active), "stalledDL");
        active.download_speed = 10;
        assert_eq!(qb_state(&active), "downloading");
        active.download_speed = 0;
        active.sources.connected = 3;
        assert_eq!(qb_state(&active), "queuedDL");

        let mut meta = item(ItemStatus::Active, 0.0);
        meta.size = 0;
        assert_eq!(qb_state(&meta), "metaDL");
    }

    #[test]
    fn eta_caps_at_the_protocol_limit() {
        let mut stalled = item(ItemStatus::Active, 0.5);
        stalled.download_speed = 0;
        stalled.eta = Some(120);
        assert_eq!(qb_eta(&stalled), ETA_CAP);

        let mut running = item(ItemStatus::Active, 0.5);
        running.download_speed = 50;
        running.eta = Some(120);
        assert_eq!(qb_eta(&running), 120);

        let complete = item(ItemStatus::Seeding, 1.0);
        assert_eq!(qb_eta(&complete), ETA_CAP);

        let mut huge = item(ItemStatus::Active, 0.1);
        huge.download_speed = 1;
        huge.eta = Some(u64::MAX);
        assert_eq!(qb_eta(&huge), ETA_CAP);
    }

    #[test]
    fn basic_header_parses() {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!("Basic {}", BASE64.encode("admin:secret"))
                .parse()
                .unwrap(),
        );
        assert_eq!(
            basic_credentials(&headers),
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert!(basic_credentials(&HeaderMap::new()).is_none());
    }
}
