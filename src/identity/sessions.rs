//! Session registry: creation, rotation, revocation, and the cache-backed
//! liveness ping.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    credentials::{generate_token, hash_token},
    transaction::settle,
    expires_after, IdentityError, IdentityService, Principal, SessionEntry,
};
use crate::store::{Device, Session, StoreTx};

/// Credentials handed to a client after a session-producing operation.
#[derive(Clone, Debug)]
pub struct Authenticated {
    pub access_token: String,
    /// Raw refresh token; only its digest is persisted.
    pub refresh_token: String,
    pub session: Session,
}

/// Result of a registration.
#[derive(Clone, Debug)]
pub struct Registration {
    pub auth: Authenticated,
    /// Present when the account still needs verification.
    pub verification_code: Option<String>,
}

#[derive(Debug)]
pub(crate) struct OpenedSession {
    pub session: Session,
    pub refresh_token: String,
}

impl IdentityService {
    pub(crate) async fn open_session(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<OpenedSession, IdentityError> {
        let refresh_token = generate_token()?;
        let expires_at = expires_after(now, self.config.session_ttl_seconds())?;
        let session = Session {
            id: Uuid::now_v7(),
            account_id,
            device_id: device.device_id.clone(),
            device_type: device.device_type.clone(),
            user_agent: device.user_agent.clone(),
            refresh_token_hash: hash_token(&refresh_token),
            created_at: now,
            last_active_at: now,
            expires_at,
            revoked_at: None,
        };
        tx.insert_session(&session).await?;

        Ok(OpenedSession {
            session,
            refresh_token,
        })
    }

    /// Touch and rotate the live session of the same device, or open a new one.
    /// Logins without a device id always open a new session.
    pub(crate) async fn login_session(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<OpenedSession, IdentityError> {
        if !device.device_id.is_empty() {
            if let Some(existing) = tx.live_session_for_device(account_id, device, now).await? {
                debug!(session_id = %existing.id, "reusing device session");
                return self
                    .rotate_session(tx, existing, Some(device.user_agent.as_str()), now)
                    .await;
            }
        }
        self.open_session(tx, account_id, device, now).await
    }

    async fn rotate_session(
        &self,
        tx: &mut dyn StoreTx,
        mut session: Session,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<OpenedSession, IdentityError> {
        let refresh_token = generate_token()?;
        session.refresh_token_hash = hash_token(&refresh_token);
        session.last_active_at = now;
        session.expires_at = expires_after(now, self.config.session_ttl_seconds())?;
        if let Some(user_agent) = user_agent.filter(|value| !value.is_empty()) {
            session.user_agent = user_agent.to_string();
        }
        tx.update_session(&session).await?;

        Ok(OpenedSession {
            session,
            refresh_token,
        })
    }

    /// Make a committed session visible to the liveness ping.
    pub(crate) async fn publish(&self, session: &Session) {
        let entry = SessionEntry {
            session_id: session.id,
            account_id: session.account_id,
            issued_at: session.last_active_at,
            expires_at: session.expires_at,
        };
        if let Err(err) = self.cache.put(entry).await {
            warn!(session_id = %session.id, "failed to publish session: {err:#}");
        }
    }

    /// Exchange a refresh token of a live session for new credentials.
    ///
    /// The presented token is rotated away, so replaying it fails even before
    /// the session expires.
    ///
    /// # Errors
    /// Returns `Unauthorized` if the token is unknown, rotated, revoked, or expired.
    pub async fn refresh(
        &self,
        principal: &Principal,
        refresh_token: &str,
    ) -> Result<Authenticated, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .refresh_in(tx.as_mut(), principal.account_id, refresh_token, now)
            .await;
        let auth = settle(tx, result).await?;

        self.publish(&auth.session).await;
        debug!(session_id = %auth.session.id, "session refreshed");

        Ok(auth)
    }

    async fn refresh_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, IdentityError> {
        let session = tx
            .session_by_refresh_hash(account_id, &hash_token(refresh_token))
            .await?
            .filter(|session| session.is_live(now))
            .ok_or(IdentityError::Unauthorized)?;
        let account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::Unauthorized)?;

        let opened = self.rotate_session(tx, session, None, now).await?;
        let access_token = self.tokens.mint(&account, opened.session.id)?;

        Ok(Authenticated {
            access_token,
            refresh_token: opened.refresh_token,
            session: opened.session,
        })
    }

    /// Revoke every session of the account in the store, then evict them from
    /// the cache.
    ///
    /// The cache purge runs even when the revoke fails and leaves a watermark,
    /// so a session state written before this call is never published again.
    /// Runs in its own transaction after the change that triggered it has
    /// committed.
    ///
    /// # Errors
    /// Returns an error if revoking the stored sessions fails.
    pub async fn invalidate_all(&self, account_id: Uuid) -> Result<usize, IdentityError> {
        let revoked = self.revoke_all(account_id).await;

        if let Err(err) = self.cache.purge_account(account_id, Utc::now()).await {
            error!(%account_id, "failed to purge cached sessions: {err:#}");
        }

        let revoked = revoked?;
        info!(%account_id, revoked, "invalidated all sessions");
        Ok(revoked)
    }

    async fn revoke_all(&self, account_id: Uuid) -> Result<usize, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = tx
            .revoke_sessions(account_id, now)
            .await
            .map_err(IdentityError::from);
        Ok(settle(tx, result).await?.len())
    }

    /// Post-commit invalidation; the primary operation already succeeded, so a
    /// failure here is reported and swallowed.
    pub(crate) async fn invalidate_all_after_commit(&self, account_id: Uuid) {
        if let Err(err) = self.invalidate_all(account_id).await {
            error!(%account_id, "failed to invalidate sessions: {err}");
        }
    }

    /// Cache-backed liveness check. A miss or a cache error reads as not live.
    pub async fn ping(&self, principal: &Principal) -> bool {
        match self.cache.get(principal.session_id).await {
            Ok(Some(entry)) => {
                entry.account_id == principal.account_id && entry.expires_at > Utc::now()
            }
            Ok(None) => false,
            Err(err) => {
                warn!(session_id = %principal.session_id, "session ping failed: {err:#}");
                false
            }
        }
    }

    /// Live sessions of the caller, most recently active first.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn list_sessions(&self, principal: &Principal) -> Result<Vec<Session>, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = tx
            .live_sessions(principal.account_id, now)
            .await
            .map_err(IdentityError::from);
        settle(tx, result).await
    }

    /// Revoke one session of the caller.
    ///
    /// # Errors
    /// Returns `NotFound` if the session does not belong to the caller or is
    /// no longer live.
    pub async fn revoke_session(
        &self,
        principal: &Principal,
        session_id: Uuid,
    ) -> Result<(), IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .revoke_session_in(tx.as_mut(), principal.account_id, session_id, now)
            .await;
        settle(tx, result).await?;

        if let Err(err) = self.cache.remove(session_id).await {
            error!(%session_id, "failed to evict revoked session: {err:#}");
        }
        info!(account_id = %principal.account_id, %session_id, "session revoked");
        Ok(())
    }

    async fn revoke_session_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        let mut session = tx
            .session_by_id(account_id, session_id)
            .await?
            .filter(|session| session.is_live(now))
            .ok_or(IdentityError::NotFound("session"))?;
        session.revoked_at = Some(now);
        tx.update_session(&session).await?;
        Ok(())
    }

    /// Revoke the caller's own session. Already revoked sessions are fine.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn logout(&self, principal: &Principal) -> Result<(), IdentityError> {
        match self.revoke_session(principal, principal.session_id).await {
            Ok(()) => Ok(()),
            Err(IdentityError::NotFound(_)) => {
                if let Err(err) = self.cache.remove(principal.session_id).await {
                    error!(session_id = %principal.session_id, "failed to evict session: {err:#}");
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
