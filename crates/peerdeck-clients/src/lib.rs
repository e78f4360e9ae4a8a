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

//! Backend client adapters.
//!
//! One adapter per supported client kind, all implementing the
//! `ClientAdapter` contract from `peerdeck-core`. Each adapter encapsulates
//! its wire dialect: the aMule adapter speaks EC through an injected
//! transport, the qBittorrent adapter speaks the WebUI HTTP API, and the
//! rTorrent adapter speaks XML-RPC with multicall batching.

pub mod amule;
pub mod connection;
pub mod qbittorrent;
pub mod rtorrent;
pub mod sync;

pub use amule::stub::StubEcTransport;
pub use amule::{
    AmuleAdapter, EcCategory, EcDownload, EcSearchHit, EcSharedFile, EcTransport, EcUpload,
};
pub use connection::{spawn_reconnect_loop, ConnectionFlags, RECONNECT_INTERVAL};
pub use qbittorrent::QbittorrentAdapter;
pub use rtorrent::RtorrentAdapter;
pub use sync::on_connect_sync;
