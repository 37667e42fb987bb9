//! Account onboarding, login, profile and password changes.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    sessions::{Authenticated, OpenedSession, Registration},
    transaction::settle,
    workflow, IdentityError, IdentityService, Message, Principal,
};
use crate::store::{Account, ArtifactKind, Device, StoreTx};

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<String>,
}

/// Profile fields to change. `None` and empty strings leave the field as is.
#[derive(Clone, Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Clone, Copy, Debug)]
pub enum LoginIdentifier<'a> {
    Email(&'a str),
    Username(&'a str),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

impl IdentityService {
    /// Create an account with its first session.
    ///
    /// # Errors
    /// Returns `Conflict` if the email or username is taken.
    pub async fn register(
        &self,
        new_account: NewAccount,
        device: Device,
    ) -> Result<Registration, IdentityError> {
        let password_hash = self.credentials.hash_password(&new_account.password).await?;
        let now = Utc::now();
        let account = Account {
            id: Uuid::now_v7(),
            name: new_account.name,
            username: new_account.username,
            email: new_account.email,
            avatar: non_empty(new_account.avatar),
            password_hash,
            verified: !self.config.require_verification(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        let result = self.register_in(tx.as_mut(), &account, &device, now).await;
        let registration = settle(tx, result).await?;

        self.publish(&registration.auth.session).await;
        if let Some(code) = &registration.verification_code {
            self.deliver(Message::registration_code(&account.email, &account.name, code))
                .await;
        }
        info!(account_id = %account.id, "account registered");

        Ok(registration)
    }

    async fn register_in(
        &self,
        tx: &mut dyn StoreTx,
        account: &Account,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<Registration, IdentityError> {
        tx.insert_account(account).await?;

        let verification_code = if account.verified {
            None
        } else {
            let issued = workflow::issue(
                tx,
                account.id,
                ArtifactKind::Registration,
                self.config.registration_code_ttl_seconds(),
                None,
                now,
            )
            .await?;
            Some(issued.token)
        };

        let OpenedSession {
            session,
            refresh_token,
        } = self.open_session(tx, account.id, device, now).await?;
        let access_token = self.tokens.mint(account, session.id)?;

        Ok(Registration {
            auth: Authenticated {
                access_token,
                refresh_token,
                session,
            },
            verification_code,
        })
    }

    /// Authenticate by email or username.
    ///
    /// An unknown identifier still costs one password verification and fails
    /// exactly like a wrong password.
    ///
    /// # Errors
    /// Returns `Unauthorized` for any credential mismatch.
    pub async fn login(
        &self,
        identifier: LoginIdentifier<'_>,
        password: &str,
        device: Device,
    ) -> Result<Authenticated, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .login_in(tx.as_mut(), identifier, password, &device, now)
            .await;
        let auth = settle(tx, result).await?;

        self.publish(&auth.session).await;
        info!(
            account_id = %auth.session.account_id,
            session_id = %auth.session.id,
            "login succeeded"
        );

        Ok(auth)
    }

    async fn login_in(
        &self,
        tx: &mut dyn StoreTx,
        identifier: LoginIdentifier<'_>,
        password: &str,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, IdentityError> {
        let account = match identifier {
            LoginIdentifier::Email(email) => tx.account_by_email(email).await?,
            LoginIdentifier::Username(username) => tx.account_by_username(username).await?,
        };

        let Some(account) = account else {
            self.credentials
                .verify_password(password, &self.dummy_hash)
                .await?;
            debug!("login for unknown identifier");
            return Err(IdentityError::Unauthorized);
        };

        if !self
            .credentials
            .verify_password(password, &account.password_hash)
            .await?
        {
            debug!(account_id = %account.id, "login with wrong password");
            return Err(IdentityError::Unauthorized);
        }

        let OpenedSession {
            session,
            refresh_token,
        } = self.login_session(tx, account.id, device, now).await?;
        let access_token = self.tokens.mint(&account, session.id)?;

        Ok(Authenticated {
            access_token,
            refresh_token,
            session,
        })
    }

    /// Apply profile changes and return an access token carrying them.
    ///
    /// # Errors
    /// Returns `Conflict` if the new username is taken.
    pub async fn update_account(
        &self,
        principal: &Principal,
        update: ProfileUpdate,
    ) -> Result<String, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .update_account_in(tx.as_mut(), principal.account_id, update, now)
            .await;
        let account = settle(tx, result).await?;

        debug!(account_id = %account.id, "account updated");
        self.tokens.mint(&account, principal.session_id)
    }

    async fn update_account_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<Account, IdentityError> {
        let mut account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;

        let mut changed = false;
        if let Some(name) = non_empty(update.name) {
            account.name = name;
            changed = true;
        }
        if let Some(username) = non_empty(update.username) {
            account.username = username;
            changed = true;
        }
        if let Some(avatar) = non_empty(update.avatar) {
            account.avatar = Some(avatar);
            changed = true;
        }

        if changed {
            account.updated_at = now;
            tx.update_account(&account).await?;
        }
        Ok(account)
    }

    /// Change the password after checking the current one, then sign out
    /// every session of the account.
    ///
    /// # Errors
    /// Returns `Unauthorized` if the old password does not match.
    pub async fn update_password(
        &self,
        principal: &Principal,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        principal.ensure_verified()?;
        let password_hash = self.credentials.hash_password(new_password).await?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .update_password_in(tx.as_mut(), principal.account_id, old_password, password_hash, now)
            .await;
        settle(tx, result).await?;

        info!(account_id = %principal.account_id, "password updated");
        self.invalidate_all_after_commit(principal.account_id).await;
        Ok(())
    }

    async fn update_password_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        old_password: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        let mut account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::Unauthorized)?;
        if !self
            .credentials
            .verify_password(old_password, &account.password_hash)
            .await?
        {
            return Err(IdentityError::Unauthorized);
        }

        account.password_hash = password_hash;
        account.updated_at = now;
        tx.update_account(&account).await?;
        Ok(())
    }

    /// Greeting for callers whose session is still live.
    ///
    /// # Errors
    /// Returns `Unauthorized` when the session ping fails.
    pub async fn fetch_content(&self, principal: &Principal) -> Result<String, IdentityError> {
        principal.ensure_verified()?;
        if !self.ping(principal).await {
            return Err(IdentityError::Unauthorized);
        }
        Ok(format!(
            "Hi {}. If you can see this, you are authenticated.",
            principal.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::test_support::{device, new_account, register_alice, TestHarness};
    use anyhow::Result;

    #[tokio::test]
    async fn register_opens_session_and_mails_code() -> Result<()> {
        let harness = TestHarness::new()?;
        let registration = register_alice(&harness.service).await?;

        let code = registration.verification_code.clone().unwrap_or_default();
        assert_eq!(code.len(), 6);

        let principal = harness.principal(&registration.auth.access_token)?;
        assert!(!principal.verified);
        assert_eq!(principal.session_id, registration.auth.session.id);
        assert!(harness.service.ping(&principal).await);

        let sent = harness.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert!(sent[0].text.contains(&code));
        Ok(())
    }

    #[tokio::test]
    async fn register_without_verification_is_verified() -> Result<()> {
        let harness = TestHarness::without_verification()?;
        let registration = register_alice(&harness.service).await?;

        assert!(registration.verification_code.is_none());
        assert!(harness.principal(&registration.auth.access_token)?.verified);
        assert!(harness.mailer.sent().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_and_leaves_no_session() -> Result<()> {
        let harness = TestHarness::new()?;
        register_alice(&harness.service).await?;

        let result = harness
            .service
            .register(new_account("Other", "other", "a@x.com"), device("desktop"))
            .await;
        assert!(matches!(result, Err(IdentityError::Conflict(ref msg)) if msg == "email already registered"));

        let result = harness
            .service
            .register(new_account("Other", "alice", "b@x.com"), device("desktop"))
            .await;
        assert!(matches!(result, Err(IdentityError::Conflict(ref msg)) if msg == "username already taken"));

        let login = harness
            .service
            .login(LoginIdentifier::Email("b@x.com"), "secret123", device("desktop"))
            .await;
        assert!(matches!(login, Err(IdentityError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn login_failures_are_uniform() -> Result<()> {
        let harness = TestHarness::new()?;
        register_alice(&harness.service).await?;

        let unknown = harness
            .service
            .login(LoginIdentifier::Email("nobody@x.com"), "secret123", device("desktop"))
            .await;
        let wrong = harness
            .service
            .login(LoginIdentifier::Email("a@x.com"), "wrong-password", device("desktop"))
            .await;

        match (unknown, wrong) {
            (Err(unknown), Err(wrong)) => {
                assert!(matches!(unknown, IdentityError::Unauthorized));
                assert_eq!(unknown.to_string(), wrong.to_string());
            }
            _ => panic!("both logins must fail"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn login_reuses_the_session_of_the_same_device() -> Result<()> {
        let harness = TestHarness::new()?;
        let registration = register_alice(&harness.service).await?;

        let again = harness
            .service
            .login(LoginIdentifier::Username("alice"), "secret123", device("desktop"))
            .await?;
        assert_eq!(again.session.id, registration.auth.session.id);
        assert_ne!(again.refresh_token, registration.auth.refresh_token);

        let anonymous = harness
            .service
            .login(LoginIdentifier::Username("alice"), "secret123", Device::default())
            .await?;
        assert_ne!(anonymous.session.id, registration.auth.session.id);
        Ok(())
    }

    #[tokio::test]
    async fn update_account_ignores_empty_fields() -> Result<()> {
        let harness = TestHarness::new()?;
        let registration = register_alice(&harness.service).await?;
        let principal = harness.principal(&registration.auth.access_token)?;

        let token = harness
            .service
            .update_account(
                &principal,
                ProfileUpdate {
                    name: Some("Alicia".to_string()),
                    username: Some(String::new()),
                    avatar: None,
                },
            )
            .await?;
        let claims = harness.service.tokens().verify(&token)?;
        assert_eq!(claims.name, "Alicia");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.sid, principal.session_id);
        Ok(())
    }

    #[tokio::test]
    async fn update_password_checks_old_password_and_signs_out() -> Result<()> {
        let harness = TestHarness::without_verification()?;
        let registration = register_alice(&harness.service).await?;
        let principal = harness.principal(&registration.auth.access_token)?;

        let wrong = harness
            .service
            .update_password(&principal, "not-it", "newsecret1")
            .await;
        assert!(matches!(wrong, Err(IdentityError::Unauthorized)));
        assert!(harness.service.ping(&principal).await);

        harness
            .service
            .update_password(&principal, "secret123", "newsecret1")
            .await?;
        assert!(!harness.service.ping(&principal).await);

        let old = harness
            .service
            .login(LoginIdentifier::Username("alice"), "secret123", device("desktop"))
            .await;
        assert!(matches!(old, Err(IdentityError::Unauthorized)));
        harness
            .service
            .login(LoginIdentifier::Username("alice"), "newsecret1", device("desktop"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn content_needs_a_verified_live_session() -> Result<()> {
        let harness = TestHarness::new()?;
        let registration = register_alice(&harness.service).await?;
        let principal = harness.principal(&registration.auth.access_token)?;

        let unverified = harness.service.fetch_content(&principal).await;
        assert!(matches!(unverified, Err(IdentityError::VerificationRequired)));

        let verified = Principal {
            verified: true,
            ..principal
        };
        assert_eq!(
            harness.service.fetch_content(&verified).await?,
            "Hi Alice. If you can see this, you are authenticated."
        );

        harness.service.logout(&verified).await?;
        let revoked = harness.service.fetch_content(&verified).await;
        assert!(matches!(revoked, Err(IdentityError::Unauthorized)));
        Ok(())
    }
}
