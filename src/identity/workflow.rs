//! Change-confirmation state machine shared by registration verification,
//! email update, and password reset.
//!
//! ```text
//! Pending ──redeem(token)────────▶ Redeemed
//!    │ ───redeem(revoke token)───▶ Revoked      (email update only)
//!    └────new request────────────▶ Superseded
//! ```
//!
//! Only the single `Pending` artifact of an (account, kind) pair is redeemable.
//! Superseded artifacts never become redeemable again. Expiry is derived from
//! `expires_at` at redemption time.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{
    credentials::{digest_matches, generate_code, generate_token, hash_token},
    expires_after, IdentityError,
};
use crate::store::{Artifact, ArtifactKind, ArtifactStatus, StoreTx};

/// A freshly opened artifact and the raw tokens that go to the user.
#[derive(Debug)]
pub(crate) struct Issued {
    pub artifact: Artifact,
    pub token: String,
    pub revoke_token: Option<String>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Presented<'a> {
    Token(&'a str),
    RevokeToken(&'a str),
}

/// Open a new pending artifact, superseding the previous one of the same kind.
pub(crate) async fn issue(
    tx: &mut dyn StoreTx,
    account_id: Uuid,
    kind: ArtifactKind,
    ttl_seconds: i64,
    target_email: Option<String>,
    now: DateTime<Utc>,
) -> Result<Issued, IdentityError> {
    if let Some(previous) = tx.pending_artifact(account_id, kind).await? {
        tx.resolve_artifact(previous.id, ArtifactStatus::Superseded, now)
            .await?;
        debug!(%account_id, %kind, artifact_id = %previous.id, "superseded pending artifact");
    }

    let token = match kind {
        ArtifactKind::Registration => generate_code(),
        ArtifactKind::EmailUpdate | ArtifactKind::PasswordReset => generate_token()?,
    };
    let revoke_token = match kind {
        ArtifactKind::EmailUpdate => Some(generate_token()?),
        ArtifactKind::Registration | ArtifactKind::PasswordReset => None,
    };

    let artifact = Artifact {
        id: Uuid::now_v7(),
        account_id,
        kind,
        token_hash: hash_token(&token),
        revoke_token_hash: revoke_token.as_deref().map(hash_token),
        target_email,
        status: ArtifactStatus::Pending,
        created_at: now,
        expires_at: expires_after(now, ttl_seconds)?,
        resolved_at: None,
    };
    tx.insert_artifact(&artifact).await?;

    Ok(Issued {
        artifact,
        token,
        revoke_token,
    })
}

/// Resolve the pending artifact with the presented token.
///
/// A wrong or unknown token is `InvalidToken`; the right token past its expiry
/// is `ExpiredToken`. The pending row stays locked until the transaction ends,
/// so concurrent redemptions of the same artifact cannot both succeed.
pub(crate) async fn redeem(
    tx: &mut dyn StoreTx,
    account_id: Uuid,
    kind: ArtifactKind,
    presented: Presented<'_>,
    now: DateTime<Utc>,
) -> Result<Artifact, IdentityError> {
    let Some(artifact) = tx.pending_artifact(account_id, kind).await? else {
        return Err(IdentityError::InvalidToken);
    };

    let (expected, token, outcome) = match presented {
        Presented::Token(token) => (
            Some(artifact.token_hash.as_slice()),
            token,
            ArtifactStatus::Redeemed,
        ),
        Presented::RevokeToken(token) => (
            artifact.revoke_token_hash.as_deref(),
            token,
            ArtifactStatus::Revoked,
        ),
    };

    let matches = expected.is_some_and(|expected| digest_matches(expected, &hash_token(token)));
    if !matches {
        return Err(IdentityError::InvalidToken);
    }
    if artifact.is_expired(now) {
        return Err(IdentityError::ExpiredToken);
    }

    tx.resolve_artifact(artifact.id, outcome, now).await?;

    Ok(Artifact {
        status: outcome,
        resolved_at: Some(now),
        ..artifact
    })
}
