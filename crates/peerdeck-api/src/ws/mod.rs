//! The WebSocket hub.
//!
//! Each connection authenticates from the signed session cookie before the
//! protocol upgrade, then runs a single select loop: inbound actions,
//! assembled-batch fan-out through the per-user transform, session
//! invalidation notices, and a periodic session revalidation heartbeat.
//! Invalidated sessions close with code 4001.

pub mod handlers;
pub mod transform;

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use peerdeck_auth::{AuthedUser, SESSION_COOKIE};

use crate::error::ApiError;
use crate::state::SharedContext;
use transform::batch_update_message;

/// Close code sent when a session expires or is invalidated.
const CLOSE_SESSION_INVALID: u16 = 4001;

/// How often live connections revalidate their session.
const SESSION_HEARTBEAT: Duration = Duration::from_secs(300);

/// Extract the raw session cookie value from request headers.
#[must_use]
pub(crate) fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for part in cookie::Cookie::split_parse(header.to_string()) {
        if let Ok(parsed) = part {
            if parsed.name() == SESSION_COOKIE {
                return Some(parsed.value().to_string());
            }
        }
    }
    None
}

/// `GET /ws` — authenticate, then upgrade.
pub(crate) async fn ws_handler(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let cookie_value = session_cookie_value(&headers).unwrap_or_default();
    let user = ctx.auth.validate_cookie(&cookie_value).await?;
    info!(user = %user.username, "websocket session established");
    Ok(upgrade
        .on_upgrade(move |socket| run_connection(socket, ctx, user, cookie_value))
        .into_response())
}

async fn owner_map(ctx: &SharedContext) -> HashMap<String, i64> {
    ctx.data.ownership.owner_map().await.unwrap_or_default()
}

async fn run_connection(
    socket: WebSocket,
    ctx: SharedContext,
    mut user: AuthedUser,
    cookie_value: String,
) {
    let (mut sink, mut stream) = socket.split();
    let mut batches = ctx.service.subscribe();
    let mut invalidations = ctx.auth.subscribe_invalidations();
    let mut heartbeat = interval(SESSION_HEARTBEAT);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await; // first tick fires immediately; skip it

    // Greeting: connected marker, search-lock state, and the latest cached
    // batch through this user's transform.
    let mut greeting = vec![
        json!({ "type": "connected" }),
        json!({ "type": "search-lock", "active": ctx.search_active() }),
    ];
    if let Some(snapshot) = ctx.service.latest_batch().await {
        greeting.push(batch_update_message(
            &snapshot,
            &user,
            &owner_map(&ctx).await,
        ));
    }
    for message in greeting {
        if send_json(&mut sink, &message).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let parsed: Value = match serde_json::from_str(&text) {
                            Ok(parsed) => parsed,
                            Err(_) => {
                                let reply = json!({ "type": "error", "message": "malformed message" });
                                if send_json(&mut sink, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        let replies = handlers::dispatch(&ctx, &user, parsed).await;
                        let mut disconnected = false;
                        for reply in replies {
                            if send_json(&mut sink, &reply).await.is_err() {
                                disconnected = true;
                                break;
                            }
                        }
                        if disconnected {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket read error");
                        break;
                    }
                }
            }
            batch = batches.recv() => {
                match batch {
                    Ok(snapshot) => {
                        let message = batch_update_message(&snapshot, &user, &owner_map(&ctx).await);
                        if send_json(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "connection lagged behind batch fan-out");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            notice = invalidations.recv() => {
                match notice {
                    Ok(user_id) if user.user_id == Some(user_id) => {
                        warn!(user = %user.username, "session invalidated; closing socket");
                        close_invalid(&mut sink).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = heartbeat.tick() => {
                match ctx.auth.validate_cookie(&cookie_value).await {
                    Ok(refreshed) => {
                        // Capability changes propagate on the next heartbeat.
                        user = refreshed;
                    }
                    Err(_) => {
                        warn!(user = %user.username, "session expired; closing socket");
                        close_invalid(&mut sink).await;
                        return;
                    }
                }
            }
        }
    }
    debug!(user = %user.username, "websocket connection closed");
}

async fn send_json(
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    message: &Value,
) -> Result<(), ()> {
    let text = serde_json::to_string(message).map_err(|_| ())?;
    sink.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn close_invalid(sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin)) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_SESSION_INVALID,
            reason: "session invalidated".into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_extraction_finds_the_session() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "other=1; peerdeck.sid=abc.def; theme=dark".parse().unwrap(),
        );
        assert_eq!(session_cookie_value(&headers).as_deref(), Some("abc.def"));

        let mut missing = HeaderMap::new();
        missing.insert(axum::http::header::COOKIE, "other=1".parse().unwrap());
        assert!(session_cookie_value(&missing).is_none());
        assert!(session_cookie_value(&HeaderMap::new()).is_none());
    }
}
