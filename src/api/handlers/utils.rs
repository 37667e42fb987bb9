//! Payload validation shared by the handlers.

use axum::http::{header::USER_AGENT, HeaderMap};
use regex::Regex;
use uuid::Uuid;

use super::types::DeviceInfo;
use crate::{api::error::ApiError, store::Device};

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_CHARS: usize = 255;
const MAX_NAME_CHARS: usize = 100;

/// Lightweight email sanity check.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.-]{1,32}$").is_ok_and(|re| re.is_match(username))
}

pub fn valid_password(password: &str) -> bool {
    (MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&password.chars().count())
}

pub fn valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_NAME_CHARS
}

/// Emails are stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn require_email(email: &str) -> Result<String, ApiError> {
    let email = normalize_email(email);
    if valid_email(&email) {
        Ok(email)
    } else {
        Err(ApiError::invalid_input("invalid email"))
    }
}

pub(crate) fn require_password(password: &str) -> Result<(), ApiError> {
    if valid_password(password) {
        Ok(())
    } else {
        Err(ApiError::invalid_input(format!(
            "password must be {MIN_PASSWORD_CHARS} to {MAX_PASSWORD_CHARS} characters"
        )))
    }
}

pub(crate) fn require_present<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::invalid_input(format!("{field} is required")))
    } else {
        Ok(trimmed)
    }
}

pub(crate) fn require_account_id(value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value.trim()).map_err(|_| ApiError::invalid_input("invalid accountUUID"))
}

/// Device fingerprint from the payload; the `User-Agent` header fills in a
/// missing user agent.
pub(crate) fn device(info: DeviceInfo, headers: &HeaderMap) -> Device {
    let user_agent = if info.user_agent.trim().is_empty() {
        headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    } else {
        info.user_agent.trim().to_string()
    };

    Device {
        device_id: info.device_id.trim().to_string(),
        device_type: info.device_type.trim().to_string(),
        user_agent,
    }
}
