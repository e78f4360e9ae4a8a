//! Per-client file listing proxies: `GET /api/{kind}/files/{hash}`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use peerdeck_core::ClientKind;

use crate::error::ApiError;
use crate::state::SharedContext;
use crate::ws::session_cookie_value;

/// Proxy the file listing of one item to the owning client kind's first
/// connected instance.
pub(crate) async fn client_files(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Path((kind, hash)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let cookie = session_cookie_value(&headers).unwrap_or_default();
    let _user = ctx.auth.validate_cookie(&cookie).await?;

    let kind = ClientKind::parse(&kind)
        .map_err(|_| ApiError::not_found(format!("unknown client type '{kind}'")))?;
    let instance = ctx
        .registry
        .get_by_kind(kind)
        .await
        .into_iter()
        .find(|(_, client)| client.adapter.is_connected())
        .ok_or_else(|| ApiError::not_found("no connected instance of that type"))?;

    let files = instance
        .1
        .adapter
        .get_files(&hash)
        .await
        .map_err(|err| ApiError::not_found(err.to_string()))?;
    Ok(Json(json!({ "hash": hash, "files": files })))
}
