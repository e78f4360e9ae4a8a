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

//! The app-wide category model.
//!
//! One ordered category set is kept coherent with every connected client's
//! native categories/labels, persisted as a single JSON document, with path
//! translation between client-side and app-side filesystems and debounced
//! validation of every configured path.

pub mod color;
pub mod error;
pub mod manager;
pub mod model;
pub mod paths;
pub mod validate;

pub use color::{amule_color_to_hex, hex_color_to_amule};
pub use error::CategoryError;
pub use manager::{CategoriesSnapshot, CategoryManager};
pub use model::{Category, CategoryUpdate, DEFAULT_CATEGORY};
pub use paths::DestPaths;
pub use validate::{FsPathValidator, PathStatus, PathValidator, ValidationReport};
