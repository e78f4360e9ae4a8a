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

//! Application composition: configuration, stores, adapters, background
//! loops, and the HTTP/WebSocket server.

pub mod bootstrap;
pub mod error;
pub mod sink;

pub use error::AppError;
