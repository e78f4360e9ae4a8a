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

//! Configuration loading for the control plane.
//!
//! `config.json` lives at the data-dir root. Environment variables overlay
//! the file through a fixed table; sensitive values prefer the environment,
//! everything else prefers the file, and typed defaults fill the gaps.
//! Prefixed client variables (`AMULE_HOST`, …) bootstrap env-sourced client
//! instances that are stripped again when the file is written back.

pub mod env;
pub mod error;
pub mod loader;
pub mod model;

pub use env::{EnvOverlay, EnvValueKind};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, save_config};
pub use model::{
    AppConfig, AuthConfig, ClientEntry, ClientSource, DirectoriesConfig, EventScriptingConfig,
    HistoryConfig, IntegrationsConfig, ServerConfig, TrustedProxyConfig,
};
