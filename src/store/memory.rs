//! In-process store for local development and tests.
//!
//! A transaction holds the state lock for its whole lifetime and works on a
//! private copy, so transactions are fully serialised and a rollback is just
//! dropping the copy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    Account, Artifact, ArtifactKind, ArtifactStatus, Device, Session, Store, StoreError, StoreTx,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    sessions: HashMap<Uuid, Session>,
    artifacts: HashMap<Uuid, Artifact>,
}

impl MemoryState {
    fn check_account_unique(&self, account: &Account) -> Result<(), StoreError> {
        for other in self.accounts.values().filter(|other| other.id != account.id) {
            if other.email == account.email {
                return Err(StoreError::Conflict("accounts_email_key".to_string()));
            }
            if other.username == account.username {
                return Err(StoreError::Conflict("accounts_username_key".to_string()));
            }
        }
        Ok(())
    }

    fn check_session_unique(&self, session: &Session) -> Result<(), StoreError> {
        let taken = self.sessions.values().any(|other| {
            other.id != session.id && other.refresh_token_hash == session.refresh_token_hash
        });
        if taken {
            return Err(StoreError::Conflict(
                "sessions_refresh_token_hash_key".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long `begin` waits for the running transaction to finish.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::Unavailable("timed out waiting for transaction lock".to_string())
            })?;
        let working = MemoryState::clone(&guard);
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        if self.working.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict("accounts_pkey".to_string()));
        }
        self.working.check_account_unique(account)?;
        self.working.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        if !self.working.accounts.contains_key(&account.id) {
            return Err(StoreError::Integrity(format!(
                "account {} does not exist",
                account.id
            )));
        }
        self.working.check_account_unique(account)?;
        self.working.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn account_by_id(&mut self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.working.accounts.get(&id).cloned())
    }

    async fn account_by_email(&mut self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .working
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn account_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .working
            .accounts
            .values()
            .find(|account| account.username == username)
            .cloned())
    }

    async fn insert_session(&mut self, session: &Session) -> Result<(), StoreError> {
        if self.working.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict("sessions_pkey".to_string()));
        }
        self.working.check_session_unique(session)?;
        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn update_session(&mut self, session: &Session) -> Result<(), StoreError> {
        if !self.working.sessions.contains_key(&session.id) {
            return Err(StoreError::Integrity(format!(
                "session {} does not exist",
                session.id
            )));
        }
        self.working.check_session_unique(session)?;
        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn session_by_id(
        &mut self,
        account_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .working
            .sessions
            .get(&session_id)
            .filter(|session| session.account_id == account_id)
            .cloned())
    }

    async fn session_by_refresh_hash(
        &mut self,
        account_id: Uuid,
        refresh_token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .working
            .sessions
            .values()
            .find(|session| {
                session.account_id == account_id
                    && session.refresh_token_hash == refresh_token_hash
            })
            .cloned())
    }

    async fn live_session_for_device(
        &mut self,
        account_id: Uuid,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .working
            .sessions
            .values()
            .filter(|session| {
                session.account_id == account_id
                    && session.device_id == device.device_id
                    && session.device_type == device.device_type
                    && session.is_live(now)
            })
            .max_by_key(|session| session.last_active_at)
            .cloned())
    }

    async fn live_sessions(
        &mut self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .working
            .sessions
            .values()
            .filter(|session| session.account_id == account_id && session.is_live(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(sessions)
    }

    async fn revoke_sessions(
        &mut self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut revoked = Vec::new();
        for session in self.working.sessions.values_mut() {
            if session.account_id == account_id && session.revoked_at.is_none() {
                session.revoked_at = Some(at);
                revoked.push(session.id);
            }
        }
        Ok(revoked)
    }

    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<(), StoreError> {
        if self.working.artifacts.contains_key(&artifact.id) {
            return Err(StoreError::Conflict(
                "verification_artifacts_pkey".to_string(),
            ));
        }
        if artifact.status == ArtifactStatus::Pending {
            let pending_exists = self.working.artifacts.values().any(|other| {
                other.account_id == artifact.account_id
                    && other.kind == artifact.kind
                    && other.status == ArtifactStatus::Pending
            });
            if pending_exists {
                return Err(StoreError::Conflict(
                    "verification_artifacts_pending_idx".to_string(),
                ));
            }
        }
        self.working.artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn pending_artifact(
        &mut self,
        account_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<Artifact>, StoreError> {
        Ok(self
            .working
            .artifacts
            .values()
            .find(|artifact| {
                artifact.account_id == account_id
                    && artifact.kind == kind
                    && artifact.status == ArtifactStatus::Pending
            })
            .cloned())
    }

    async fn resolve_artifact(
        &mut self,
        artifact_id: Uuid,
        status: ArtifactStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let artifact = self
            .working
            .artifacts
            .get_mut(&artifact_id)
            .filter(|artifact| artifact.status == ArtifactStatus::Pending)
            .ok_or_else(|| {
                StoreError::Integrity(format!("artifact {artifact_id} is not pending"))
            })?;
        artifact.status = status;
        artifact.resolved_at = Some(at);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn account(email: &str, username: &str) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            username: username.to_string(),
            email: email.to_string(),
            avatar: None,
            password_hash: "hash".to_string(),
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn commit_persists_writes() -> Result<()> {
        let store = MemoryStore::new();
        let alice = account("a@x.com", "a");

        let mut tx = store.begin().await?;
        tx.insert_account(&alice).await?;
        tx.commit().await?;

        let mut tx = store.begin().await?;
        assert_eq!(tx.account_by_email("a@x.com").await?, Some(alice));
        Ok(())
    }

    #[tokio::test]
    async fn rollback_discards_writes() -> Result<()> {
        let store = MemoryStore::new();

        let mut tx = store.begin().await?;
        tx.insert_account(&account("a@x.com", "a")).await?;
        tx.rollback().await?;

        let mut tx = store.begin().await?;
        assert!(tx.account_by_username("a").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() -> Result<()> {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await?;
            tx.insert_account(&account("a@x.com", "a")).await?;
        }
        let mut tx = store.begin().await?;
        assert!(tx.account_by_email("a@x.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_and_username_conflict() -> Result<()> {
        let store = MemoryStore::new();
        let mut tx = store.begin().await?;
        tx.insert_account(&account("a@x.com", "a")).await?;

        let err = tx.insert_account(&account("a@x.com", "b")).await;
        assert!(matches!(err, Err(StoreError::Conflict(name)) if name == "accounts_email_key"));

        let err = tx.insert_account(&account("b@x.com", "a")).await;
        assert!(
            matches!(err, Err(StoreError::Conflict(name)) if name == "accounts_username_key")
        );
        Ok(())
    }

    #[tokio::test]
    async fn second_pending_artifact_conflicts() -> Result<()> {
        let store = MemoryStore::new();
        let owner = account("a@x.com", "a");
        let now = Utc::now();
        let artifact = Artifact {
            id: Uuid::new_v4(),
            account_id: owner.id,
            kind: ArtifactKind::PasswordReset,
            token_hash: vec![1],
            revoke_token_hash: None,
            target_email: None,
            status: ArtifactStatus::Pending,
            created_at: now,
            expires_at: now,
            resolved_at: None,
        };

        let mut tx = store.begin().await?;
        tx.insert_account(&owner).await?;
        tx.insert_artifact(&artifact).await?;
        let duplicate = Artifact {
            id: Uuid::new_v4(),
            ..artifact.clone()
        };
        assert!(matches!(
            tx.insert_artifact(&duplicate).await,
            Err(StoreError::Conflict(_))
        ));

        tx.resolve_artifact(artifact.id, ArtifactStatus::Superseded, now)
            .await?;
        tx.insert_artifact(&duplicate).await?;
        assert!(tx
            .resolve_artifact(artifact.id, ArtifactStatus::Redeemed, now)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn begin_times_out_while_another_transaction_runs() -> Result<()> {
        let store = MemoryStore::new().with_lock_timeout(Duration::from_millis(20));
        let _held = store.begin().await?;
        assert!(matches!(
            store.begin().await,
            Err(StoreError::Unavailable(_))
        ));
        Ok(())
    }
}
