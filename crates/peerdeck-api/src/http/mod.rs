//! HTTP router assembly.

pub mod compat_qb;
pub mod files;
pub mod login;
pub mod torznab;
pub mod users;
pub mod version;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::SharedContext;
use crate::ws;

/// Build the full application router.
#[must_use]
pub fn build_router(ctx: SharedContext) -> Router {
    let router = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/login", post(login::login))
        .route("/api/logout", post(login::logout))
        .route("/api/session", get(login::session_info))
        .route("/api/users", get(users::list).post(users::create))
        .route("/api/users/{id}", put(users::update).delete(users::remove))
        .route("/api/users/{id}/capabilities", put(users::set_capabilities))
        .route("/api/users/{id}/apikey", post(users::rotate_api_key))
        .route("/api/version", get(version::current))
        .route("/api/version/seen", post(version::mark_seen))
        .route("/api/{kind}/files/{hash}", get(files::client_files));
    let router = compat_qb::mount(router);
    let router = torznab::mount(router);
    router.layer(TraceLayer::new_for_http()).with_state(ctx)
}
