//! Bearer token extraction.
//!
//! Handlers resolve the `Authorization: Bearer <jwt>` header into an
//! [`identity::Principal`](crate::identity::Principal) before calling into the
//! identity service. Any failure is a uniform 401.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::debug;

use crate::{
    api::error::ApiError,
    identity::{IdentityService, Principal},
};

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Principal from a valid, unexpired access token.
pub(crate) fn require_auth(
    headers: &HeaderMap,
    service: &IdentityService,
) -> Result<Principal, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
    service
        .tokens()
        .verify(token)
        .map(|claims| claims.principal())
        .map_err(|err| {
            debug!("Rejected access token: {err}");
            ApiError::unauthorized()
        })
}

/// Like [`require_auth`] but tolerates an expired token; used by refresh.
pub(crate) fn require_auth_allow_expired(
    headers: &HeaderMap,
    service: &IdentityService,
) -> Result<Principal, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
    service
        .tokens()
        .verify_allow_expired(token)
        .map(|claims| claims.principal())
        .map_err(|err| {
            debug!("Rejected access token: {err}");
            ApiError::unauthorized()
        })
}
