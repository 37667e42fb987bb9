//! Identity orchestration: accounts, sessions, and change-confirmation workflows.
//!
//! Every operation follows the same shape: validate, open one store transaction,
//! run the domain steps against it, then commit or roll back through
//! [`transaction::settle`]. Side effects that must not outlive a failed write
//! (publishing sessions to the ping cache, invalidating sessions, sending
//! mail) only run after the commit succeeded, and their failures are logged
//! rather than returned.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

pub mod accounts;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod email_update;
pub mod error;
pub mod mailer;
pub mod password_reset;
pub mod sessions;
pub mod tokens;
mod transaction;
pub mod verification;
mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use accounts::{LoginIdentifier, NewAccount, ProfileUpdate};
pub use cache::{MemorySessionCache, SessionCache, SessionEntry};
pub use config::IdentityConfig;
pub use credentials::Credentials;
pub use email_update::EmailChange;
pub use error::IdentityError;
pub use mailer::{LogMailer, Mailer, Message, WebhookMailer};
pub use sessions::{Authenticated, Registration};
pub use tokens::{AccessClaims, TokenIssuer};

use crate::store::{Store, StoreError};

/// The authenticated caller, taken from a validated access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub account_id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub verified: bool,
}

impl Principal {
    /// Tokens minted before registration verification only reach the
    /// verification, refresh, profile, and session endpoints.
    ///
    /// # Errors
    /// Returns `VerificationRequired` for unverified callers.
    pub fn ensure_verified(&self) -> Result<(), IdentityError> {
        if self.verified {
            Ok(())
        } else {
            Err(IdentityError::VerificationRequired)
        }
    }
}

pub struct IdentityService {
    config: IdentityConfig,
    store: Arc<dyn Store>,
    cache: Arc<dyn SessionCache>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenIssuer,
    credentials: Credentials,
    // Verified against when the login identifier is unknown, so both failure
    // paths cost one argon2 verification.
    dummy_hash: String,
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    /// # Errors
    /// Returns an error if the password cost parameters are invalid.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn SessionCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, IdentityError> {
        let credentials =
            Credentials::new(config.password_memory_kib(), config.password_iterations())?;
        let dummy_hash = credentials.hash_password_blocking(&credentials::generate_token()?)?;
        let tokens = TokenIssuer::new(&config);

        Ok(Self {
            config,
            store,
            cache,
            mailer,
            tokens,
            credentials,
            dummy_hash,
        })
    }

    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// # Errors
    /// Returns the store error when the backend is unreachable.
    pub async fn store_ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    async fn deliver(&self, message: Message) {
        if let Err(err) = self.mailer.send(&message).await {
            error!(
                to_email = %message.to,
                template = ?message.template,
                "failed to send email: {err:#}"
            );
        }
    }
}

/// `now + ttl_seconds`, or `Internal` when the lifespan does not fit a timestamp.
pub(crate) fn expires_after(
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<DateTime<Utc>, IdentityError> {
    Duration::try_seconds(ttl_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| IdentityError::Internal(anyhow!("lifespan of {ttl_seconds}s is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifespans_out_of_range_are_errors() {
        let now = Utc::now();
        assert!(matches!(expires_after(now, 60), Ok(at) if at == now + Duration::seconds(60)));
        assert!(matches!(
            expires_after(now, i64::MAX),
            Err(IdentityError::Internal(_))
        ));
        assert!(matches!(
            expires_after(now, 400_000 * 365 * 24 * 60 * 60),
            Err(IdentityError::Internal(_))
        ));
    }

    #[test]
    fn unverified_principals_are_scoped() {
        let mut principal = Principal {
            account_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            name: "Alice".to_string(),
            verified: false,
        };
        assert!(matches!(
            principal.ensure_verified(),
            Err(IdentityError::VerificationRequired)
        ));
        principal.verified = true;
        assert!(principal.ensure_verified().is_ok());
    }
}
