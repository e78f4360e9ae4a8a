#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! HTTP and WebSocket surface.
//!
//! The WebSocket hub carries the browser UI: authenticated sessions, a
//! closed action vocabulary gated by capabilities, and per-connection
//! broadcast transforms. The HTTP side hosts the login endpoints, the
//! admin users CRUD, per-client file proxies, version endpoints, and the
//! compatibility APIs (qBittorrent-WebUI REST plus the Torznab indexer).

pub mod error;
pub mod http;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use http::build_router;
pub use state::{AppContext, SharedContext};
