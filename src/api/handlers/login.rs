use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    clear_cookie_headers,
    principal::require_auth,
    types::{AccessTokenResponse, EmailLoginRequest, UsernameLoginRequest},
    utils::{device, normalize_email, require_present},
    with_refresh_cookie,
};
use crate::{
    api::error::{ApiError, ErrorBody},
    identity::{Authenticated, IdentityService, LoginIdentifier},
};

fn login_response(service: &IdentityService, auth: Authenticated) -> Result<Response, ApiError> {
    with_refresh_cookie(
        service,
        &auth.refresh_token,
        AccessTokenResponse {
            access_token: auth.access_token,
        },
    )
}

#[utoipa::path(
    post,
    path = "/auth/email",
    request_body = EmailLoginRequest,
    responses(
        (status = 200, description = "Logged in; refresh token set as cookie", body = AccessTokenResponse),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers, payload))]
pub async fn login_email(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    payload: Option<Json<EmailLoginRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let email = normalize_email(require_present("email", &request.email)?);
    require_present("password", &request.password)?;

    let auth = service
        .login(
            LoginIdentifier::Email(&email),
            &request.password,
            device(request.device, &headers),
        )
        .await?;
    login_response(&service, auth)
}

#[utoipa::path(
    post,
    path = "/auth/username",
    request_body = UsernameLoginRequest,
    responses(
        (status = 200, description = "Logged in; refresh token set as cookie", body = AccessTokenResponse),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers, payload))]
pub async fn login_username(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    payload: Option<Json<UsernameLoginRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let username = require_present("username", &request.username)?.to_string();
    require_present("password", &request.password)?;

    let auth = service
        .login(
            LoginIdentifier::Username(&username),
            &request.password,
            device(request.device, &headers),
        )
        .await?;
    login_response(&service, auth)
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session revoked and cookie cleared"),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers))]
pub async fn logout(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    service.logout(&principal).await?;
    Ok((StatusCode::NO_CONTENT, clear_cookie_headers()).into_response())
}
