use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    clear_cookie_headers,
    principal::require_auth,
    types::{
        ForgotPasswordRequest, ForgotPasswordResponse, MessageResponse, ResetPasswordRequest,
        UpdatePasswordRequest,
    },
    utils::{require_account_id, require_email, require_password, require_present},
};
use crate::{
    api::error::{ApiError, ErrorBody},
    identity::{IdentityError, IdentityService},
};

#[utoipa::path(
    post,
    path = "/password/update",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password changed; all sessions signed out", body = MessageResponse),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 401, description = "Wrong current password or invalid access token", body = ErrorBody),
        (status = 403, description = "Account not verified", body = ErrorBody),
    ),
    tag = "password"
)]
#[instrument(skip(service, headers, payload))]
pub async fn update_password(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    payload: Option<Json<UpdatePasswordRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    require_present("oldPassword", &request.old_password)?;
    require_password(&request.new_password)?;

    service
        .update_password(&principal, &request.old_password, &request.new_password)
        .await?;
    Ok((
        StatusCode::OK,
        clear_cookie_headers(),
        Json(MessageResponse::new("password updated")),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset token issued", body = ForgotPasswordResponse),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 401, description = "Unknown account", body = ErrorBody),
    ),
    tag = "password"
)]
#[instrument(skip(service, payload))]
pub async fn forgot_password(
    service: Extension<Arc<IdentityService>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let email = require_email(&request.email)?;

    match service.forgot_password(&email).await {
        Ok(token) => Ok(Json(ForgotPasswordResponse { token }).into_response()),
        Err(IdentityError::NotFound(_)) => {
            debug!("Password reset for unknown email");
            Err(ApiError::unauthorized())
        }
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    post,
    path = "/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset; all sessions signed out", body = MessageResponse),
        (status = 400, description = "Invalid body or wrong, used or expired token", body = ErrorBody),
    ),
    tag = "password"
)]
#[instrument(skip(service, payload))]
pub async fn reset_password(
    service: Extension<Arc<IdentityService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let account_id = require_account_id(&request.account_uuid)?;
    let token = require_present("token", &request.token)?;
    require_password(&request.new_password)?;

    service
        .reset_password(account_id, token, &request.new_password)
        .await?;
    Ok(Json(MessageResponse::new("password reset")).into_response())
}
