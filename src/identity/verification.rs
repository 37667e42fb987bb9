//! Registration verification.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::{
    transaction::settle,
    workflow::{self, Presented},
    IdentityError, IdentityService, Message, Principal,
};
use crate::store::{Account, ArtifactKind, StoreTx};

impl IdentityService {
    /// Redeem the registration code and return an access token for the same
    /// session that now carries `verified = true`.
    ///
    /// # Errors
    /// Returns `InvalidToken` for a wrong or used code and `ExpiredToken` when
    /// the right code arrives too late.
    pub async fn verify_registration(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<String, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .verify_registration_in(tx.as_mut(), principal.account_id, code, now)
            .await;
        let account = settle(tx, result).await?;

        info!(account_id = %account.id, "account verified");
        self.tokens.mint(&account, principal.session_id)
    }

    async fn verify_registration_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, IdentityError> {
        workflow::redeem(
            tx,
            account_id,
            ArtifactKind::Registration,
            Presented::Token(code),
            now,
        )
        .await?;

        let mut account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;
        account.verified = true;
        account.updated_at = now;
        tx.update_account(&account).await?;
        Ok(account)
    }

    /// Replace the pending registration code with a fresh one.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the account is already verified.
    pub async fn resend_registration_code(
        &self,
        principal: &Principal,
    ) -> Result<String, IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .resend_registration_code_in(tx.as_mut(), principal.account_id, now)
            .await;
        let (account, code) = settle(tx, result).await?;

        self.deliver(Message::registration_code(&account.email, &account.name, &code))
            .await;
        info!(account_id = %account.id, "registration code reissued");
        Ok(code)
    }

    async fn resend_registration_code_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Account, String), IdentityError> {
        let account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;
        if account.verified {
            return Err(IdentityError::InvalidInput(
                "account already verified".to_string(),
            ));
        }

        let issued = workflow::issue(
            tx,
            account_id,
            ArtifactKind::Registration,
            self.config.registration_code_ttl_seconds(),
            None,
            now,
        )
        .await?;
        Ok((account, issued.token))
    }
}
