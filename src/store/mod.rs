//! Transactional persistence for accounts, sessions, and verification artifacts.
//!
//! Every multi-step identity operation runs inside one [`StoreTx`]. A transaction
//! only persists its writes when [`StoreTx::commit`] succeeds; dropping it or calling
//! [`StoreTx::rollback`] discards them.
//!
//! Two backends ship with the crate:
//! - [`PgStore`] for Postgres (`postgres://` DSNs), using row locks to serialise
//!   concurrent redemption of the same artifact.
//! - [`MemoryStore`] (`memory://`) for local development and tests. It runs one
//!   transaction at a time against a snapshot of the whole state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use models::{Account, Artifact, ArtifactKind, ArtifactStatus, Device, Session};
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the constraint name.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored row is missing or cannot be decoded.
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error(transparent)]
    Backend(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Cheap reachability check used by `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError>;
    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError>;
    async fn account_by_id(&mut self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn account_by_email(&mut self, email: &str) -> Result<Option<Account>, StoreError>;
    async fn account_by_username(&mut self, username: &str)
        -> Result<Option<Account>, StoreError>;

    async fn insert_session(&mut self, session: &Session) -> Result<(), StoreError>;
    async fn update_session(&mut self, session: &Session) -> Result<(), StoreError>;
    async fn session_by_id(
        &mut self,
        account_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Session>, StoreError>;
    async fn session_by_refresh_hash(
        &mut self,
        account_id: Uuid,
        refresh_token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError>;
    /// Most recently active live session for a device fingerprint.
    async fn live_session_for_device(
        &mut self,
        account_id: Uuid,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;
    async fn live_sessions(
        &mut self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;
    /// Revoke every unrevoked session of the account, returning their ids.
    async fn revoke_sessions(
        &mut self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError>;

    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<(), StoreError>;
    /// Fetch the pending artifact for (account, kind), locking it until the
    /// transaction ends.
    async fn pending_artifact(
        &mut self,
        account_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<Artifact>, StoreError>;
    async fn resolve_artifact(
        &mut self,
        artifact_id: Uuid,
        status: ArtifactStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// `memory://` DSNs select the in-process backend.
#[must_use]
pub fn is_memory_dsn(dsn: &str) -> bool {
    dsn.starts_with("memory://")
}
