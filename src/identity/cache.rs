//! Session-ping cache.
//!
//! Entries are published after the session commits and evicted on logout,
//! revocation, or account-wide invalidation. Readers treat a miss or an error as
//! "not live".
//!
//! Account-wide invalidation also leaves a watermark: an entry issued at or
//! before it is dropped on `put`, so a publish that loses the race against
//! invalidation cannot bring a revoked session back.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEntry {
    pub session_id: Uuid,
    pub account_id: Uuid,
    /// When the session state behind this entry was written.
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn put(&self, entry: SessionEntry) -> Result<()>;
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionEntry>>;
    async fn remove(&self, session_id: Uuid) -> Result<()>;
    /// Drop every entry of the account and refuse entries issued at or before
    /// `at`; returns how many were removed.
    async fn purge_account(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<usize>;
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<Uuid, SessionEntry>,
    invalidated: HashMap<Uuid, DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct MemorySessionCache {
    state: RwLock<CacheState>,
}

impl MemorySessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn put(&self, entry: SessionEntry) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .invalidated
            .get(&entry.account_id)
            .is_some_and(|at| entry.issued_at <= *at)
        {
            return Ok(());
        }
        state.entries.insert(entry.session_id, entry);
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionEntry>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        match state.entries.get(&session_id).cloned() {
            Some(entry) if entry.expires_at <= now => {
                state.entries.remove(&session_id);
                Ok(None)
            }
            entry => Ok(entry),
        }
    }

    async fn remove(&self, session_id: Uuid) -> Result<()> {
        self.state.write().await.entries.remove(&session_id);
        Ok(())
    }

    async fn purge_account(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        let watermark = state.invalidated.entry(account_id).or_insert(at);
        if *watermark < at {
            *watermark = at;
        }
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.account_id != account_id);
        Ok(before - state.entries.len())
    }
}
