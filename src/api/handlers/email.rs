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
        EmailChangeResponse, MessageResponse, RevokeEmailUpdateRequest, UpdateEmailRequest,
        ValidateEmailUpdateRequest,
    },
    utils::{require_account_id, require_email, require_present},
};
use crate::{
    api::error::{ApiError, ErrorBody},
    identity::{EmailChange, IdentityService},
};

fn change_response(change: EmailChange) -> Response {
    Json(EmailChangeResponse {
        token: change.token,
        revoke_token: change.revoke_token,
    })
    .into_response()
}

#[utoipa::path(
    post,
    path = "/email/update",
    request_body = UpdateEmailRequest,
    responses(
        (status = 200, description = "Confirmation and revoke tokens issued", body = EmailChangeResponse),
        (status = 400, description = "Invalid or unchanged email", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Account not verified", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    tag = "email"
)]
#[instrument(skip(service, headers, payload))]
pub async fn update_email(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    payload: Option<Json<UpdateEmailRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let new_email = require_email(&request.new_email)?;

    let change = service.request_email_update(&principal, &new_email).await?;
    Ok(change_response(change))
}

#[utoipa::path(
    post,
    path = "/email/update/resend",
    responses(
        (status = 200, description = "Pending email change reissued", body = EmailChangeResponse),
        (status = 400, description = "No email change in progress", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Account not verified", body = ErrorBody),
    ),
    tag = "email"
)]
#[instrument(skip(service, headers))]
pub async fn resend_email_update(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let change = service.resend_email_update(&principal).await?;
    Ok(change_response(change))
}

#[utoipa::path(
    post,
    path = "/email/update/validate",
    request_body = ValidateEmailUpdateRequest,
    responses(
        (status = 200, description = "Email updated; all sessions signed out", body = MessageResponse),
        (status = 400, description = "Wrong, used or expired token", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    tag = "email"
)]
#[instrument(skip(service, payload))]
pub async fn validate_email_update(
    service: Extension<Arc<IdentityService>>,
    payload: Option<Json<ValidateEmailUpdateRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let account_id = require_account_id(&request.account_uuid)?;
    let token = require_present("token", &request.token)?;

    service.validate_email_update(account_id, token).await?;
    Ok(Json(MessageResponse::new("email updated")).into_response())
}

#[utoipa::path(
    post,
    path = "/email/update/revoke",
    request_body = RevokeEmailUpdateRequest,
    responses(
        (status = 200, description = "Email change cancelled", body = MessageResponse),
        (status = 400, description = "Nothing to revoke", body = ErrorBody),
    ),
    tag = "email"
)]
#[instrument(skip(service, payload))]
pub async fn revoke_email_update(
    service: Extension<Arc<IdentityService>>,
    payload: Option<Json<RevokeEmailUpdateRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_body());
    };
    let account_id = require_account_id(&request.account_uuid)?;
    let revoke_token = require_present("revokeToken", &request.revoke_token)?;

    service.revoke_email_update(account_id, revoke_token).await?;
    Ok(Json(MessageResponse::new("email update revoked")).into_response())
}
