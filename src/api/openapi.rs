use super::{
    error::ErrorBody,
    handlers::{account, content, email, health, login, password, register, session, types},
};
use utoipa::{
    openapi::{Contact, License},
    OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        register::register,
        register::verify_registration,
        register::resend_registration_code,
        login::login_email,
        login::login_username,
        login::logout,
        account::update_account,
        account::refresh,
        email::update_email,
        email::resend_email_update,
        email::validate_email_update,
        email::revoke_email_update,
        password::update_password,
        password::forgot_password,
        password::reset_password,
        session::list_sessions,
        session::revoke_session,
        content::content,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        types::DeviceInfo,
        types::RegisterRequest,
        types::RegisterResponse,
        types::VerifyRegistrationRequest,
        types::VerificationCodeResponse,
        types::EmailLoginRequest,
        types::UsernameLoginRequest,
        types::AccessTokenResponse,
        types::UpdateAccountRequest,
        types::UpdateEmailRequest,
        types::EmailChangeResponse,
        types::ValidateEmailUpdateRequest,
        types::RevokeEmailUpdateRequest,
        types::UpdatePasswordRequest,
        types::ForgotPasswordRequest,
        types::ForgotPasswordResponse,
        types::ResetPasswordRequest,
        types::MessageResponse,
        types::SessionView,
        types::SessionListResponse,
    )),
    tags(
        (name = "auth", description = "Registration, verification and login"),
        (name = "account", description = "Profile changes and token refresh"),
        (name = "email", description = "Email change confirmation"),
        (name = "password", description = "Password change and recovery"),
        (name = "session", description = "Device sessions"),
        (name = "content", description = "Session-gated content"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}
