//! Forgotten password recovery.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::{
    transaction::settle,
    workflow::{self, Presented},
    IdentityError, IdentityService, Message,
};
use crate::store::{Account, ArtifactKind, StoreTx};

impl IdentityService {
    /// Open a password reset for the account behind `email` and return its token.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown addresses.
    pub async fn forgot_password(&self, email: &str) -> Result<String, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self.forgot_password_in(tx.as_mut(), email, now).await;
        let (account, token) = settle(tx, result).await?;

        self.deliver(Message::password_reset(&account.email, &account.name, &token))
            .await;
        info!(account_id = %account.id, "password reset requested");
        Ok(token)
    }

    async fn forgot_password_in(
        &self,
        tx: &mut dyn StoreTx,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(Account, String), IdentityError> {
        let account = tx
            .account_by_email(email)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;
        let issued = workflow::issue(
            tx,
            account.id,
            ArtifactKind::PasswordReset,
            self.config.change_token_ttl_seconds(),
            None,
            now,
        )
        .await?;
        Ok((account, issued.token))
    }

    /// Set a new password with a reset token, then sign out every session.
    ///
    /// # Errors
    /// Returns `InvalidToken` or `ExpiredToken` for a bad token.
    pub async fn reset_password(
        &self,
        account_id: Uuid,
        token: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let password_hash = self.credentials.hash_password(new_password).await?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .reset_password_in(tx.as_mut(), account_id, token, password_hash, now)
            .await;
        settle(tx, result).await?;

        info!(%account_id, "password reset");
        self.invalidate_all_after_commit(account_id).await;
        Ok(())
    }

    async fn reset_password_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        token: &str,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        workflow::redeem(
            tx,
            account_id,
            ArtifactKind::PasswordReset,
            Presented::Token(token),
            now,
        )
        .await?;

        let mut account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;
        account.password_hash = password_hash;
        account.updated_at = now;
        tx.update_account(&account).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{
        test_support::{device, register_alice, TestHarness},
        LoginIdentifier,
    };
    use anyhow::Result;

    #[tokio::test]
    async fn reset_signs_out_earlier_sessions() -> Result<()> {
        let harness = TestHarness::new()?;
        let registration = register_alice(&harness.service).await?;
        let principal = harness.principal(&registration.auth.access_token)?;
        assert!(harness.service.ping(&principal).await);

        let token = harness.service.forgot_password("a@x.com").await?;
        let sent = harness.mailer.sent().await;
        assert!(sent.iter().any(|message| message.text.contains(&token)));

        harness
            .service
            .reset_password(principal.account_id, &token, "brandnew99")
            .await?;
        assert!(!harness.service.ping(&principal).await);

        let refresh = harness
            .service
            .refresh(&principal, &registration.auth.refresh_token)
            .await;
        assert!(matches!(refresh, Err(IdentityError::Unauthorized)));

        harness
            .service
            .login(LoginIdentifier::Email("a@x.com"), "brandnew99", device("desktop"))
            .await?;

        let reused = harness
            .service
            .reset_password(principal.account_id, &token, "another99")
            .await;
        assert!(matches!(reused, Err(IdentityError::InvalidToken)));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() -> Result<()> {
        let harness = TestHarness::new()?;
        let result = harness.service.forgot_password("nobody@x.com").await;
        assert!(matches!(result, Err(IdentityError::NotFound("account"))));
        assert!(harness.mailer.sent().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_reset_keeps_sessions() -> Result<()> {
        let harness = TestHarness::new()?;
        let registration = register_alice(&harness.service).await?;
        let principal = harness.principal(&registration.auth.access_token)?;
        harness.service.forgot_password("a@x.com").await?;

        let result = harness
            .service
            .reset_password(principal.account_id, "not-the-token", "brandnew99")
            .await;
        assert!(matches!(result, Err(IdentityError::InvalidToken)));
        assert!(harness.service.ping(&principal).await);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_redemptions_succeed_once() -> Result<()> {
        let harness = TestHarness::new()?;
        let registration = register_alice(&harness.service).await?;
        let account_id = harness.principal(&registration.auth.access_token)?.account_id;
        let token = harness.service.forgot_password("a@x.com").await?;

        let service = std::sync::Arc::new(harness.service);
        let first = {
            let service = service.clone();
            let token = token.clone();
            tokio::spawn(async move { service.reset_password(account_id, &token, "first-pass").await })
        };
        let second = {
            let service = service.clone();
            let token = token.clone();
            tokio::spawn(async move { service.reset_password(account_id, &token, "second-pass").await })
        };

        let results = [first.await?, second.await?];
        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|result| matches!(result, Err(IdentityError::InvalidToken))));
        Ok(())
    }
}
