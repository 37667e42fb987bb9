//! API handlers and shared helpers.
//!
//! Handlers validate the payload shape first (400 before any transaction
//! opens), resolve the caller from the bearer token where needed, then hand off
//! to [`IdentityService`]. Cookies are only set once the service call returned,
//! i.e. after its transaction committed.

pub mod account;
pub mod content;
pub(crate) mod cookie;
pub mod email;
pub mod health;
pub mod login;
pub mod password;
pub(crate) mod principal;
pub mod register;
pub mod session;
pub mod types;
pub(crate) mod utils;

use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::{api::error::ApiError, identity::IdentityService};

/// JSON response that also sets the rotated refresh token cookie.
pub(crate) fn with_refresh_cookie<T: Serialize>(
    service: &IdentityService,
    refresh_token: &str,
    body: T,
) -> Result<Response, ApiError> {
    let cookie = cookie::refresh_cookie(refresh_token, service.config().session_ttl_seconds())
        .map_err(|err| {
            error!("Failed to build refresh cookie: {err}");
            ApiError::internal()
        })?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

/// Headers that expire the refresh token cookie.
pub(crate) fn clear_cookie_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie::clear_refresh_cookie());
    headers
}
