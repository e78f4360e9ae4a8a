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

//! Cross-filesystem move orchestration and filesystem permission probes.
//!
//! Moves run through a single worker: clients that relocate natively are
//! delegated to and polled; everyone else gets a copy-verify-delete pass
//! with byte/file progress persisted for the UI overlay. Clients flagged
//! `pause_before_move` are paused around the move and resumed afterwards.

pub mod error;
pub mod executor;
pub mod manager;
pub mod probes;

pub use error::MoveError;
pub use executor::{copy_with_progress, MoveProgress};
pub use manager::{MoveManager, QueueMoveRequest};
pub use probes::{delete_probe_code, move_probe_code, path_is_writable, DeleteProbe, MoveProbe};
