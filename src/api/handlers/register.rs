use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    principal::require_auth,
    types::{
        RegisterRequest, RegisterResponse, VerificationCodeResponse, VerifyRegistrationRequest,
        AccessTokenResponse,
    },
    utils::{device, require_email, require_password, require_present, valid_name, valid_username},
    with_refresh_cookie,
};
use crate::{
    api::error::{ApiError, ErrorBody},
    identity::{IdentityService, NewAccount},
};

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created; refresh token set as cookie", body = RegisterResponse),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 409, description = "Email or username already registered", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers, payload))]
pub async fn register(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };

    if !valid_name(&request.name) {
        return Err(ApiError::invalid_input("invalid name"));
    }
    let username = request.username.trim().to_string();
    if !valid_username(&username) {
        return Err(ApiError::invalid_input("invalid username"));
    }
    let email = require_email(&request.email)?;
    require_password(&request.password)?;

    let new_account = NewAccount {
        name: request.name.trim().to_string(),
        username,
        email,
        password: request.password,
        avatar: request.avatar.map(|avatar| avatar.trim().to_string()),
    };
    let registration = service
        .register(new_account, device(request.device, &headers))
        .await?;

    with_refresh_cookie(
        &service,
        &registration.auth.refresh_token,
        RegisterResponse {
            access_token: registration.auth.access_token,
            verification_code: registration.verification_code,
        },
    )
}

#[utoipa::path(
    post,
    path = "/register/verify",
    request_body = VerifyRegistrationRequest,
    responses(
        (status = 200, description = "Account verified", body = AccessTokenResponse),
        (status = 400, description = "Wrong, used or expired code", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers, payload))]
pub async fn verify_registration(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    payload: Option<Json<VerifyRegistrationRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let code = require_present("verificationCode", &request.verification_code)?;

    let access_token = service.verify_registration(&principal, code).await?;
    Ok(Json(AccessTokenResponse { access_token }).into_response())
}

#[utoipa::path(
    post,
    path = "/register/resend",
    responses(
        (status = 200, description = "New verification code issued", body = VerificationCodeResponse),
        (status = 400, description = "Account already verified", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers))]
pub async fn resend_registration_code(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let verification_code = service.resend_registration_code(&principal).await?;
    Ok(Json(VerificationCodeResponse { verification_code }).into_response())
}
