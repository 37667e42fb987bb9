use thiserror::Error;

use crate::store::StoreError;

/// Domain failures surfaced by identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{0}")]
    InvalidInput(String),
    /// Wrong, unknown, superseded or already used confirmation token.
    #[error("invalid verification token")]
    InvalidToken,
    /// The right token, presented after its artifact expired.
    #[error("verification token expired, request a new one")]
    ExpiredToken,
    #[error("invalid credentials")]
    Unauthorized,
    #[error("account verification required")]
    VerificationRequired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(constraint) => Self::Conflict(conflict_message(&constraint)),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

fn conflict_message(constraint: &str) -> String {
    if constraint.contains("email") {
        "email already registered".to_string()
    } else if constraint.contains("username") {
        "username already taken".to_string()
    } else if constraint.contains("pending") {
        "another request is already in progress".to_string()
    } else {
        "resource already exists".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violations_become_conflicts() {
        let err = IdentityError::from(StoreError::Conflict("accounts_email_key".to_string()));
        assert!(matches!(err, IdentityError::Conflict(ref msg) if msg == "email already registered"));

        let err = IdentityError::from(StoreError::Conflict("accounts_username_key".to_string()));
        assert!(matches!(err, IdentityError::Conflict(ref msg) if msg == "username already taken"));
    }

    #[test]
    fn other_store_errors_are_internal() {
        let err = IdentityError::from(StoreError::Unavailable("down".to_string()));
        assert!(matches!(err, IdentityError::Internal(_)));
    }
}
