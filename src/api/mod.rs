use crate::{
    api::handlers::{account, content, email, health, login, password, register, session},
    identity::IdentityService,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, patch, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::{openapi, ApiDoc};

/// Build the router with every route, the request-id/trace/CORS layers and
/// the shared identity service.
pub fn app(service: Arc<IdentityService>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/register", post(register::register))
        .route("/register/verify", post(register::verify_registration))
        .route("/register/resend", post(register::resend_registration_code))
        .route("/auth/email", post(login::login_email))
        .route("/auth/username", post(login::login_username))
        .route("/auth/logout", post(login::logout))
        .route("/account", patch(account::update_account))
        .route("/refresh", patch(account::refresh))
        .route("/email/update", post(email::update_email))
        .route("/email/update/resend", post(email::resend_email_update))
        .route("/email/update/validate", post(email::validate_email_update))
        .route("/email/update/revoke", post(email::revoke_email_update))
        .route("/password/update", post(password::update_password))
        .route("/password/forgot", post(password::forgot_password))
        .route("/password/reset", post(password::reset_password))
        .route("/session", get(session::list_sessions))
        .route("/session/revoke/:session_id", post(session::revoke_session))
        .route("/content", get(content::content))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(service)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, service: Arc<IdentityService>) -> Result<()> {
    let app = app(service);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
