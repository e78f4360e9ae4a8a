//! Admin-only user management (`/api/users`).
//!
//! Every mutation that touches credentials, the disabled flag, or the
//! capability set destroys the target's sessions; unless it was a
//! self-edit, the hub force-closes the affected sockets.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use peerdeck_auth::{hash_password, AuthedUser, Capability};
use peerdeck_data::{NewUser, UserRecord, UserUpdate};

use crate::error::ApiError;
use crate::state::SharedContext;
use crate::ws::session_cookie_value;

pub(crate) async fn require_admin(
    ctx: &SharedContext,
    headers: &HeaderMap,
) -> Result<AuthedUser, ApiError> {
    let cookie = session_cookie_value(headers).unwrap_or_default();
    let user = ctx.auth.validate_cookie(&cookie).await?;
    if !user.is_admin {
        return Err(ApiError::forbidden("Insufficient permissions"));
    }
    Ok(user)
}

fn user_json(user: &UserRecord) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "isAdmin": user.is_admin,
        "disabled": user.disabled,
        "hasApiKey": user.api_key.is_some(),
        "capabilities": user.capabilities,
        "lastLoginAt": user.last_login_at,
    })
}

/// `GET /api/users`.
pub(crate) async fn list(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx, &headers).await?;
    let users = ctx.data.users.list().await?;
    Ok(Json(json!({
        "users": users.iter().map(user_json).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateUserBody {
    username: String,
    password: Option<String>,
    #[serde(default)]
    is_admin: bool,
    #[serde(default)]
    capabilities: Vec<String>,
}

fn validated_capabilities(labels: &[String]) -> Result<Vec<String>, ApiError> {
    labels
        .iter()
        .map(|label| {
            Capability::parse(label)
                .map(|capability| capability.as_str().to_string())
                .ok_or_else(|| ApiError::bad_request(format!("unknown capability '{label}'")))
        })
        .collect()
}

/// `POST /api/users`.
pub(crate) async fn create(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Json(body): Json<CreateUserBody>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx, &headers).await?;
    let capabilities = validated_capabilities(&body.capabilities)?;
    let password_hash = body
        .password
        .as_deref()
        .map(|password| hash_password(password, 10))
        .transpose()?;
    let user = ctx
        .data
        .users
        .create(&NewUser {
            username: body.username,
            password_hash,
            is_admin: body.is_admin,
            capabilities,
        })
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    info!(user = %user.username, "user created");
    Ok(Json(user_json(&user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateUserBody {
    username: Option<String>,
    password: Option<String>,
    is_admin: Option<bool>,
    disabled: Option<bool>,
}

/// `PUT /api/users/{id}`.
pub(crate) async fn update(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(&ctx, &headers).await?;
    let password_hash = body
        .password
        .as_deref()
        .map(|password| hash_password(password, 10))
        .transpose()?;

    let invalidates = body.username.is_some()
        || password_hash.is_some()
        || body.disabled.is_some()
        || body.is_admin.is_some();

    let user = ctx
        .data
        .users
        .update(
            id,
            &UserUpdate {
                username: body.username,
                password_hash: password_hash.map(Some),
                is_admin: body.is_admin,
                disabled: body.disabled,
                api_key: None,
            },
        )
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    if invalidates {
        let self_edit = actor.user_id == Some(id);
        ctx.auth.invalidate_user(id, self_edit).await?;
    }
    Ok(Json(user_json(&user)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CapabilitiesBody {
    capabilities: Vec<String>,
}

/// `PUT /api/users/{id}/capabilities`.
pub(crate) async fn set_capabilities(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<CapabilitiesBody>,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(&ctx, &headers).await?;
    let capabilities = validated_capabilities(&body.capabilities)?;
    ctx.data.users.set_capabilities(id, &capabilities).await?;
    let self_edit = actor.user_id == Some(id);
    ctx.auth.invalidate_user(id, self_edit).await?;

    let user = ctx
        .data
        .users
        .by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(user_json(&user)))
}

/// `POST /api/users/{id}/apikey` — rotate the admin API key.
pub(crate) async fn rotate_api_key(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx, &headers).await?;
    let target = ctx
        .data
        .users
        .by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    if !target.is_admin {
        return Err(ApiError::bad_request("API keys are admin-only"));
    }

    let mut bytes = [0_u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    let api_key: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();

    ctx.data
        .users
        .update(
            id,
            &UserUpdate {
                api_key: Some(Some(api_key.clone())),
                ..UserUpdate::default()
            },
        )
        .await?;
    Ok(Json(json!({ "apiKey": api_key })))
}

/// `DELETE /api/users/{id}`.
pub(crate) async fn remove(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(&ctx, &headers).await?;
    if actor.user_id == Some(id) {
        return Err(ApiError::bad_request("cannot delete your own account"));
    }
    ctx.auth.invalidate_user(id, false).await?;
    let removed = ctx.data.users.delete(id).await?;
    if !removed {
        return Err(ApiError::not_found("user not found"));
    }
    info!(user_id = id, "user deleted");
    Ok(Json(json!({ "success": true })))
}
