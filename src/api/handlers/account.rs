use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    cookie::extract_refresh_token,
    principal::{require_auth, require_auth_allow_expired},
    types::{AccessTokenResponse, UpdateAccountRequest},
    utils::{valid_name, valid_username},
    with_refresh_cookie,
};
use crate::{
    api::error::{ApiError, ErrorBody},
    identity::{IdentityService, ProfileUpdate},
};

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[utoipa::path(
    patch,
    path = "/account",
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Profile updated", body = AccessTokenResponse),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 409, description = "Username already taken", body = ErrorBody),
    ),
    tag = "account"
)]
#[instrument(skip(service, headers, payload))]
pub async fn update_account(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    payload: Option<Json<UpdateAccountRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };

    let update = ProfileUpdate {
        name: trimmed(request.name),
        username: trimmed(request.username),
        avatar: trimmed(request.avatar),
    };
    if update.name.as_deref().is_some_and(|name| !valid_name(name)) {
        return Err(ApiError::invalid_input("invalid name"));
    }
    if update
        .username
        .as_deref()
        .is_some_and(|username| !valid_username(username))
    {
        return Err(ApiError::invalid_input("invalid username"));
    }

    let access_token = service.update_account(&principal, update).await?;
    Ok(Json(AccessTokenResponse { access_token }).into_response())
}

#[utoipa::path(
    patch,
    path = "/refresh",
    responses(
        (status = 200, description = "Tokens rotated; new refresh token set as cookie", body = AccessTokenResponse),
        (status = 401, description = "Missing, rotated, revoked or expired refresh token", body = ErrorBody),
    ),
    tag = "account"
)]
#[instrument(skip(service, headers))]
pub async fn refresh(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let principal = require_auth_allow_expired(&headers, &service)?;
    let refresh_token = extract_refresh_token(&headers).ok_or_else(ApiError::missing_refresh_token)?;

    let auth = service.refresh(&principal, &refresh_token).await?;
    with_refresh_cookie(
        &service,
        &auth.refresh_token,
        AccessTokenResponse {
            access_token: auth.access_token,
        },
    )
}
