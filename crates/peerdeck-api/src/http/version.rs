//! Version endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::SharedContext;

const SEEN_MARKER: &str = "version_seen.json";

/// `GET /api/version`.
pub(crate) async fn current(State(ctx): State<SharedContext>) -> Json<Value> {
    let seen_version = std::fs::read_to_string(ctx.data_dir.join(SEEN_MARKER))
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|doc| doc["version"].as_str().map(str::to_string));
    let seen = seen_version.as_deref() == Some(ctx.app_version.as_str());
    Json(json!({ "version": ctx.app_version, "seen": seen }))
}

/// `POST /api/version/seen` — remember that the changelog for the running
/// version was acknowledged.
pub(crate) async fn mark_seen(State(ctx): State<SharedContext>) -> Result<Json<Value>, ApiError> {
    let marker = json!({ "version": ctx.app_version });
    tokio::fs::write(
        ctx.data_dir.join(SEEN_MARKER),
        serde_json::to_vec_pretty(&marker).map_err(|err| ApiError::internal(err.to_string()))?,
    )
    .await
    .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(json!({ "success": true })))
}
