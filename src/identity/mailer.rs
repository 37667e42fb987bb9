//! Outbound email delivery.
//!
//! Messages are sent after the owning transaction commits. A failed send is
//! logged by the caller and never rolls back the operation; every token the
//! mail carries is also returned in the API response.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    RegistrationCode,
    EmailUpdateConfirm,
    EmailUpdateNotice,
    PasswordReset,
}

impl Template {
    #[must_use]
    pub const fn subject(self) -> &'static str {
        match self {
            Self::RegistrationCode => "Your verification code",
            Self::EmailUpdateConfirm => "Confirm your new email address",
            Self::EmailUpdateNotice => "Your email address is being changed",
            Self::PasswordReset => "Reset your password",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub to: String,
    pub template: Template,
    pub subject: String,
    pub text: String,
}

impl Message {
    #[must_use]
    pub fn registration_code(to: &str, name: &str, code: &str) -> Self {
        Self::new(
            to,
            Template::RegistrationCode,
            format!("Hi {name}, your verification code is {code}."),
        )
    }

    #[must_use]
    pub fn email_update_confirm(to: &str, name: &str, token: &str) -> Self {
        Self::new(
            to,
            Template::EmailUpdateConfirm,
            format!("Hi {name}, use this token to confirm your new email address: {token}"),
        )
    }

    #[must_use]
    pub fn email_update_notice(to: &str, name: &str, new_email: &str, revoke_token: &str) -> Self {
        Self::new(
            to,
            Template::EmailUpdateNotice,
            format!(
                "Hi {name}, a change of your email address to {new_email} was requested. \
                 If this was not you, revoke it with this token: {revoke_token}"
            ),
        )
    }

    #[must_use]
    pub fn password_reset(to: &str, name: &str, token: &str) -> Self {
        Self::new(
            to,
            Template::PasswordReset,
            format!("Hi {name}, use this token to reset your password: {token}"),
        )
    }

    fn new(to: &str, template: Template, text: String) -> Self {
        Self {
            to: to.to_string(),
            template,
            subject: template.subject().to_string(),
            text,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Local dev mailer that logs instead of delivering.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        info!(
            to_email = %message.to,
            template = ?message.template,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Posts each message as JSON to an HTTP relay.
#[derive(Clone, Debug)]
pub struct WebhookMailer {
    client: Client,
    url: Url,
}

impl WebhookMailer {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Error creating reqwest client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(message)
            .send()
            .await
            .context("mail webhook request failed")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("mail webhook rejected message (status={status}): {body}"))
    }
}
