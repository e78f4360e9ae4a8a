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

//! Authentication, authorization, and abuse protection.
//!
//! Covers the capability algebra consulted before every WebSocket action,
//! bcrypt password handling (including the first-run plaintext migration),
//! the per-IP brute-force limiter, and HMAC-signed session cookies.

pub mod capability;
pub mod error;
pub mod lockout;
pub mod manager;
pub mod password;
pub mod session;

pub use capability::{required_capabilities, AuthedUser, Capability};
pub use error::AuthError;
pub use lockout::{FailureOutcome, LoginRateLimiter};
pub use manager::{AuthManager, LoginOutcome};
pub use password::{hash_password, password_meets_policy, verify_password, PasswordCheck};
pub use session::{issue_session_id, parse_signed_cookie, sign_session_id, SESSION_COOKIE};
