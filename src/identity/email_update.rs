//! Email change: request, confirm with the token sent to the new address,
//! or cancel with the revoke token sent to the current one.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::{
    transaction::settle,
    workflow::{self, Issued, Presented},
    IdentityError, IdentityService, Message, Principal,
};
use crate::store::{Account, ArtifactKind, StoreTx};

/// Tokens of a pending email change.
#[derive(Clone, Debug)]
pub struct EmailChange {
    pub token: String,
    pub revoke_token: String,
}

impl IdentityService {
    /// Start an email change, superseding any change already in flight.
    ///
    /// # Errors
    /// Returns `InvalidInput` for the current address and `Conflict` when the
    /// new address belongs to another account.
    pub async fn request_email_update(
        &self,
        principal: &Principal,
        new_email: &str,
    ) -> Result<EmailChange, IdentityError> {
        principal.ensure_verified()?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .request_email_update_in(tx.as_mut(), principal.account_id, new_email, now)
            .await;
        let (account, issued) = settle(tx, result).await?;

        self.email_update_requested(&account, issued).await
    }

    async fn request_email_update_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        new_email: &str,
        now: DateTime<Utc>,
    ) -> Result<(Account, Issued), IdentityError> {
        let account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;
        if account.email == new_email {
            return Err(IdentityError::InvalidInput(
                "new email matches the current one".to_string(),
            ));
        }
        if tx.account_by_email(new_email).await?.is_some() {
            return Err(IdentityError::Conflict("email already registered".to_string()));
        }

        let issued = workflow::issue(
            tx,
            account_id,
            ArtifactKind::EmailUpdate,
            self.config.change_token_ttl_seconds(),
            Some(new_email.to_string()),
            now,
        )
        .await?;
        Ok((account, issued))
    }

    /// Reissue the pending email change for the same target address.
    ///
    /// # Errors
    /// Returns `InvalidInput` if no change is pending.
    pub async fn resend_email_update(
        &self,
        principal: &Principal,
    ) -> Result<EmailChange, IdentityError> {
        principal.ensure_verified()?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .resend_email_update_in(tx.as_mut(), principal.account_id, now)
            .await;
        let (account, issued) = settle(tx, result).await?;

        self.email_update_requested(&account, issued).await
    }

    async fn resend_email_update_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Account, Issued), IdentityError> {
        let account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;
        let target = tx
            .pending_artifact(account_id, ArtifactKind::EmailUpdate)
            .await?
            .and_then(|artifact| artifact.target_email)
            .ok_or_else(|| IdentityError::InvalidInput("no email update in progress".to_string()))?;

        let issued = workflow::issue(
            tx,
            account_id,
            ArtifactKind::EmailUpdate,
            self.config.change_token_ttl_seconds(),
            Some(target),
            now,
        )
        .await?;
        Ok((account, issued))
    }

    async fn email_update_requested(
        &self,
        account: &Account,
        issued: Issued,
    ) -> Result<EmailChange, IdentityError> {
        let (Some(target), Some(revoke_token)) = (issued.artifact.target_email, issued.revoke_token)
        else {
            return Err(IdentityError::Internal(anyhow::anyhow!(
                "email update artifact without target or revoke token"
            )));
        };

        self.deliver(Message::email_update_confirm(
            &target,
            &account.name,
            &issued.token,
        ))
        .await;
        self.deliver(Message::email_update_notice(
            &account.email,
            &account.name,
            &target,
            &revoke_token,
        ))
        .await;
        info!(account_id = %account.id, "email update requested");

        Ok(EmailChange {
            token: issued.token,
            revoke_token,
        })
    }

    /// Apply the pending email change and sign out every session.
    ///
    /// # Errors
    /// Returns `InvalidToken`/`ExpiredToken` for a bad token and `Conflict`
    /// if the address was taken in the meantime.
    pub async fn validate_email_update(
        &self,
        account_id: Uuid,
        token: &str,
    ) -> Result<(), IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = self
            .validate_email_update_in(tx.as_mut(), account_id, token, now)
            .await;
        settle(tx, result).await?;

        info!(%account_id, "email updated");
        self.invalidate_all_after_commit(account_id).await;
        Ok(())
    }

    async fn validate_email_update_in(
        &self,
        tx: &mut dyn StoreTx,
        account_id: Uuid,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        let artifact = workflow::redeem(
            tx,
            account_id,
            ArtifactKind::EmailUpdate,
            Presented::Token(token),
            now,
        )
        .await?;
        let email = artifact
            .target_email
            .ok_or(IdentityError::InvalidToken)?;

        let mut account = tx
            .account_by_id(account_id)
            .await?
            .ok_or(IdentityError::NotFound("account"))?;
        account.email = email;
        account.updated_at = now;
        tx.update_account(&account).await?;
        Ok(())
    }

    /// Cancel the pending email change without touching the account.
    ///
    /// # Errors
    /// Returns `InvalidToken` if nothing matching is pending.
    pub async fn revoke_email_update(
        &self,
        account_id: Uuid,
        revoke_token: &str,
    ) -> Result<(), IdentityError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let result = workflow::redeem(
            tx.as_mut(),
            account_id,
            ArtifactKind::EmailUpdate,
            Presented::RevokeToken(revoke_token),
            now,
        )
        .await;
        settle(tx, result).await?;

        info!(%account_id, "email update revoked");
        Ok(())
    }
}
