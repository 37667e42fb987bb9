//! HS256 access tokens.

use anyhow::anyhow;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{expires_after, IdentityConfig, IdentityError, Principal};
use crate::store::Account;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id.
    pub sub: Uuid,
    /// Session the token is bound to.
    pub sid: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub verified: bool,
}

impl AccessClaims {
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal {
            account_id: self.sub,
            session_id: self.sid,
            name: self.name.clone(),
            verified: self.verified,
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_seconds: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        let secret = config.jwt_secret().expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.jwt_issuer().to_string(),
            ttl_seconds: config.access_token_ttl_seconds(),
        }
    }

    /// Mint an access token for `account` bound to `session_id`.
    ///
    /// # Errors
    /// Returns an error if encoding fails or the token lifespan is out of range.
    pub fn mint(&self, account: &Account, session_id: Uuid) -> Result<String, IdentityError> {
        let now = Utc::now();
        let expires_at = expires_after(now, self.ttl_seconds)?;
        let claims = AccessClaims {
            sub: account.id,
            sid: session_id,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            name: account.name.clone(),
            username: account.username.clone(),
            email: account.email.clone(),
            verified: account.verified,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| IdentityError::Internal(anyhow!("jwt encode: {err}")))
    }

    /// Verify signature, issuer and expiry.
    ///
    /// # Errors
    /// Returns `Unauthorized` for any invalid token.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, IdentityError> {
        self.decode(token, true)
    }

    /// Verify signature and issuer but accept expired tokens. Only the refresh
    /// flow uses this, and it still requires the refresh cookie.
    ///
    /// # Errors
    /// Returns `Unauthorized` for any invalid token.
    pub fn verify_allow_expired(&self, token: &str) -> Result<AccessClaims, IdentityError> {
        self.decode(token, false)
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<AccessClaims, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = validate_exp;
        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| IdentityError::Unauthorized)
    }
}
