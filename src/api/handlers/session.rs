use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::{
    principal::require_auth,
    types::{SessionListResponse, SessionView},
};
use crate::{
    api::error::{ApiError, ErrorBody},
    identity::IdentityService,
};

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Live sessions of the caller", body = SessionListResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
    ),
    tag = "session"
)]
#[instrument(skip(service, headers))]
pub async fn list_sessions(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let sessions = service
        .list_sessions(&principal)
        .await?
        .into_iter()
        .map(|session| SessionView::new(session, principal.session_id))
        .collect();
    Ok(Json(SessionListResponse { sessions }).into_response())
}

#[utoipa::path(
    post,
    path = "/session/revoke/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session to revoke")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 404, description = "No live session with this id", body = ErrorBody),
    ),
    tag = "session"
)]
#[instrument(skip(service, headers))]
pub async fn revoke_session(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    service.revoke_session(&principal, session_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
