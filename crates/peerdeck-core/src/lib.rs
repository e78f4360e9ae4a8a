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

//! Client-agnostic interfaces and DTOs shared across the workspace.
//!
//! This crate holds the capability meta table (the single source of truth for
//! per-client behavioural branching), the deterministic instance identity
//! scheme, the unified item model produced by the pipeline, the adapter
//! contract every backend client implements, and the process-wide registry
//! of live adapter instances.

pub mod adapter;
pub mod error;
pub mod instance;
pub mod item;
pub mod meta;
pub mod registry;

pub use adapter::{
    AddOptions, CategoryEditOutcome, CategorySpec, ClientAdapter, ClientFile, ClientIdentity,
    DeleteOutcome, DeleteRequest, EnsureCategoryOutcome, FetchBatch, NetworkHealth, NetworkStatus,
    SearchQuery, SearchResult, ServerInfo, TransferMetrics, UploadSlot,
};
pub use error::{CoreError, CoreResult};
pub use instance::{generate_instance_id, sanitize_host, validate_instance_id};
pub use item::{
    CompoundKey, Ed2kExtras, GeoInfo, ItemStatus, Peer, SourceCounts, TorrentExtras, TrackerInfo,
    UnifiedItem, UnifiedPriority,
};
pub use meta::{CapabilityFlags, ClientKind, ClientMeta, NetworkClass};
pub use registry::{ClientRegistry, RegisteredClient};
