use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::principal::require_auth;
use crate::{
    api::error::{ApiError, ErrorBody},
    identity::IdentityService,
};

#[utoipa::path(
    get,
    path = "/content",
    responses(
        (status = 200, description = "Greeting for callers with a live session", body = String, content_type = "text/plain"),
        (status = 401, description = "Invalid token or session no longer live", body = ErrorBody),
        (status = 403, description = "Account not verified", body = ErrorBody),
    ),
    tag = "content"
)]
#[instrument(skip(service, headers))]
pub async fn content(
    service: Extension<Arc<IdentityService>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let greeting = service.fetch_content(&principal).await?;
    Ok(greeting.into_response())
}
