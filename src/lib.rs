//! # accountd
//!
//! Account and session lifecycle service: registration with email
//! verification, login by email or username, rotating refresh tokens, email
//! change and password recovery workflows, and per-device session management.
//!
//! ## Layout
//!
//! - [`store`]: transactional persistence (Postgres or in-process).
//! - [`identity`]: the operations themselves. Each runs in one store
//!   transaction; session publication, session invalidation and mail delivery
//!   happen only after it commits.
//! - [`api`]: axum routes, payload validation and error shaping.
//! - [`cli`]: command line parsing, telemetry and server wiring.
//!
//! ## Tokens
//!
//! Access tokens are short-lived HS256 JWTs bound to a session (`sid`).
//! Refresh tokens are opaque, rotate on every use, travel only in the
//! `refreshToken` cookie, and are stored as SHA-256 digests. Confirmation
//! tokens (registration codes, email change and password reset tokens) are
//! single-use and only the newest one per account and workflow is redeemable.

pub mod api;
pub mod cli;
pub mod identity;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
