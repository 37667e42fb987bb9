//! Request/response types for the HTTP endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::Session;

/// Device fingerprint sent with registration and login.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_type: String,
    pub user_agent: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub device: DeviceInfo,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRegistrationRequest {
    pub verification_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCodeResponse {
    pub verification_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EmailLoginRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub device: DeviceInfo,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UsernameLoginRequest {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    pub device: DeviceInfo,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmailRequest {
    pub new_email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EmailChangeResponse {
    pub token: String,
    pub revoke_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ValidateEmailUpdateRequest {
    #[serde(rename = "accountUUID")]
    pub account_uuid: String,
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevokeEmailUpdateRequest {
    #[serde(rename = "accountUUID")]
    pub account_uuid: String,
    #[serde(rename = "revokeToken")]
    pub revoke_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordResponse {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    #[serde(rename = "accountUUID")]
    pub account_uuid: String,
    pub token: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub device_id: String,
    pub device_type: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// True for the session the request was made with.
    pub current: bool,
}

impl SessionView {
    pub fn new(session: Session, current_session: Uuid) -> Self {
        Self {
            current: session.id == current_session,
            session_id: session.id,
            device_id: session.device_id,
            device_type: session.device_type,
            user_agent: session.user_agent,
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn register_request_reads_flattened_device() -> Result<()> {
        let request: RegisterRequest = serde_json::from_value(json!({
            "name": "Alice",
            "username": "alice",
            "email": "a@x.com",
            "password": "secret123",
            "deviceId": "phone",
            "deviceType": "ios",
        }))?;
        assert_eq!(request.device.device_id, "phone");
        assert_eq!(request.device.device_type, "ios");
        assert!(request.device.user_agent.is_empty());
        assert!(request.avatar.is_none());
        Ok(())
    }

    #[test]
    fn account_uuid_keeps_its_wire_name() -> Result<()> {
        let request: ResetPasswordRequest = serde_json::from_value(json!({
            "accountUUID": "0190f5b6-0000-7000-8000-000000000000",
            "token": "tok",
            "newPassword": "secret123",
        }))?;
        assert_eq!(request.new_password, "secret123");

        let value = serde_json::to_value(&request)?;
        assert!(value.get("accountUUID").is_some());
        Ok(())
    }

    #[test]
    fn register_response_omits_missing_code() -> Result<()> {
        let value = serde_json::to_value(RegisterResponse {
            access_token: "jwt".to_string(),
            verification_code: None,
        })?;
        assert_eq!(value, json!({ "accessToken": "jwt" }));
        Ok(())
    }
}
