//! HTTP error shaping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::identity::IdentityError;

/// JSON body of every error response.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `invalid-request-body`.
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid-request-body", message)
    }

    #[must_use]
    pub fn missing_body() -> Self {
        Self::invalid_input("missing or malformed request body")
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "invalid credentials")
    }

    #[must_use]
    pub fn missing_refresh_token() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "missing-refresh-token",
            "refresh token cookie is missing",
        )
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal-server-error",
            "internal server error",
        )
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidInput(message) => Self::invalid_input(message),
            IdentityError::InvalidToken => {
                Self::new(StatusCode::BAD_REQUEST, "unauthorized", err.to_string())
            }
            IdentityError::ExpiredToken => {
                Self::new(StatusCode::BAD_REQUEST, "expired-token", err.to_string())
            }
            IdentityError::Unauthorized => Self::unauthorized(),
            IdentityError::VerificationRequired => Self::new(
                StatusCode::FORBIDDEN,
                "verification-required",
                err.to_string(),
            ),
            IdentityError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not-found", err.to_string())
            }
            IdentityError::Conflict(message) => Self::new(StatusCode::CONFLICT, "conflict", message),
            IdentityError::Internal(err) => {
                error!("Internal error: {err:#}");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn identity_errors_map_to_statuses() {
        let cases = [
            (IdentityError::InvalidInput("bad".to_string()), 400, "invalid-request-body"),
            (IdentityError::InvalidToken, 400, "unauthorized"),
            (IdentityError::ExpiredToken, 400, "expired-token"),
            (IdentityError::Unauthorized, 401, "unauthorized"),
            (IdentityError::VerificationRequired, 403, "verification-required"),
            (IdentityError::NotFound("session"), 404, "not-found"),
            (IdentityError::Conflict("taken".to_string()), 409, "conflict"),
            (IdentityError::Internal(anyhow!("db down")), 500, "internal-server-error"),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status().as_u16(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let api = ApiError::from(IdentityError::Internal(anyhow!("password=hunter2")));
        assert_eq!(api.message, "internal server error");
    }
}
