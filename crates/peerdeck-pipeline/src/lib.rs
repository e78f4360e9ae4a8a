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

//! The unified data pipeline.
//!
//! Scheduler tick → connected adapters' `fetch_data` → cross-client
//! assembly → enrichment (GeoIP, reverse DNS, history backfill) → move
//! overlay → atomic cache replacement → fan-out. One instance failing never
//! aborts a tick, and ticks are strictly sequential.

pub mod assemble;
pub mod enrich;
pub mod scheduler;
pub mod service;

pub use assemble::assemble_items;
pub use enrich::{GeoIpResolver, HostResolver, NoopResolver};
pub use scheduler::{spawn_metrics_sampler, spawn_nightly_cleanup, spawn_scheduler};
pub use service::{BatchSnapshot, DataFetchService, PipelineDeps};
