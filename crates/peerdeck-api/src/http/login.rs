//! Browser login/logout and session introspection.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, State};
use axum::http::{header::SET_COOKIE, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use peerdeck_auth::SESSION_COOKIE;
use peerdeck_events::Event;

use crate::error::ApiError;
use crate::state::SharedContext;
use crate::ws::session_cookie_value;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginBody {
    username: String,
    password: String,
}

/// Resolve the caller address, honouring `X-Forwarded-For` only from
/// configured trusted proxies.
pub(crate) fn client_ip(ctx: &SharedContext, peer: SocketAddr, headers: &HeaderMap) -> IpAddr {
    let peer_ip = peer.ip();
    if !ctx.trusted_proxy.enabled {
        return peer_ip;
    }
    let peer_label = peer_ip.to_string();
    if !ctx
        .trusted_proxy
        .proxies
        .iter()
        .any(|proxy| proxy == &peer_label)
    {
        return peer_ip;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or(peer_ip)
}

fn session_cookie_header(value: &str) -> String {
    format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax")
}

fn clear_cookie_header() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// `POST /api/login`.
pub(crate) async fn login(
    State(ctx): State<SharedContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&ctx, peer, &headers);
    let outcome = ctx.auth.login(&body.username, &body.password, ip).await?;
    info!(user = %body.username, ip = %ip, "login succeeded");
    ctx.events.publish(Event::UserLoggedIn {
        username: body.username,
        remote_addr: ip.to_string(),
    });

    let mut response = Json(json!({
        "success": true,
        "username": outcome.session.username,
        "isAdmin": outcome.session.is_admin,
    }))
    .into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        session_cookie_header(&outcome.cookie_value)
            .parse()
            .map_err(|_| ApiError::internal("cookie encoding failed"))?,
    );
    Ok(response)
}

/// `POST /api/logout`.
pub(crate) async fn logout(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(value) = session_cookie_value(&headers) {
        ctx.auth.logout(&value).await?;
    }
    let mut response = Json(json!({ "success": true })).into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        clear_cookie_header()
            .parse()
            .map_err(|_| ApiError::internal("cookie encoding failed"))?,
    );
    Ok(response)
}

/// `GET /api/session` — who am I.
pub(crate) async fn session_info(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cookie = session_cookie_value(&headers).unwrap_or_default();
    let user = ctx.auth.validate_cookie(&cookie).await?;
    Ok(Json(json!({
        "username": user.username,
        "isAdmin": user.is_admin,
        "capabilities": user
            .capabilities
            .iter()
            .map(|capability| capability.as_str())
            .collect::<Vec<_>>(),
        "authenticated": true,
    })))
}
