use accountd::{
    api,
    identity::{IdentityConfig, IdentityService, LogMailer, MemorySessionCache},
    store::MemoryStore,
};
use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    service: Arc<IdentityService>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).context("response body is not JSON")
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn refresh_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| {
                value
                    .split(';')
                    .next()
                    .and_then(|pair| pair.strip_prefix("refreshToken="))
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
            })
    }
}

impl TestApp {
    fn new(require_verification: bool) -> Result<Self> {
        let config = IdentityConfig::new(SecretString::from(
            "integration-test-signing-secret".to_string(),
        ))
        .with_password_cost(64, 1)
        .with_require_verification(require_verification);

        let service = Arc::new(IdentityService::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySessionCache::new()),
            Arc::new(LogMailer),
        )?);

        Ok(Self {
            router: api::app(service.clone()),
            service,
        })
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Result<Reply> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(refresh) = cookie {
            builder = builder.header(header::COOKIE, format!("refreshToken={refresh}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await?.to_vec();
        Ok(Reply {
            status,
            headers,
            body,
        })
    }

    async fn register(&self, username: &str, email: &str, device_id: &str) -> Result<Reply> {
        self.send(
            Method::POST,
            "/register",
            None,
            None,
            Some(json!({
                "name": "Alice",
                "username": username,
                "email": email,
                "password": "secret123",
                "deviceId": device_id,
                "deviceType": "web",
                "userAgent": "integration/1.0",
            })),
        )
        .await
    }

    fn account_id(&self, access_token: &str) -> Result<String> {
        Ok(self.service.tokens().verify(access_token)?.sub.to_string())
    }
}

fn access_token(reply: &Reply) -> Result<String> {
    reply.json()?["accessToken"]
        .as_str()
        .map(str::to_string)
        .context("missing accessToken")
}

#[tokio::test]
async fn registration_verification_flow() -> Result<()> {
    let app = TestApp::new(true)?;

    let reply = app.register("alice", "a@x.com", "desktop").await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.refresh_cookie().is_some());
    let body = reply.json()?;
    let token = access_token(&reply)?;
    let code = body["verificationCode"]
        .as_str()
        .context("missing verificationCode")?
        .to_string();

    // Unverified accounts cannot read content yet.
    let reply = app
        .send(Method::GET, "/content", Some(&token), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = app
        .send(
            Method::POST,
            "/register/verify",
            Some(&token),
            None,
            Some(json!({ "verificationCode": "wrong-code" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()?["error"], "unauthorized");

    let reply = app
        .send(
            Method::POST,
            "/register/verify",
            Some(&token),
            None,
            Some(json!({ "verificationCode": code })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    let verified = access_token(&reply)?;

    let reply = app
        .send(Method::GET, "/content", Some(&verified), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.text(),
        "Hi Alice. If you can see this, you are authenticated."
    );

    // A used code is spent.
    let reply = app
        .send(
            Method::POST,
            "/register/verify",
            Some(&verified),
            None,
            Some(json!({ "verificationCode": code })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_conflicts() -> Result<()> {
    let app = TestApp::new(true)?;
    assert_eq!(
        app.register("alice", "a@x.com", "desktop").await?.status,
        StatusCode::OK
    );

    let reply = app.register("alice2", "A@X.com", "desktop").await?;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.json()?["error"], "conflict");
    Ok(())
}

#[tokio::test]
async fn missing_or_invalid_body_is_rejected() -> Result<()> {
    let app = TestApp::new(true)?;

    let reply = app.send(Method::POST, "/register", None, None, None).await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()?["error"], "invalid-request-body");

    let reply = app
        .send(
            Method::POST,
            "/auth/email",
            None,
            None,
            Some(json!({ "email": "a@x.com", "password": "" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn login_failures_are_uniform() -> Result<()> {
    let app = TestApp::new(false)?;
    app.register("alice", "a@x.com", "desktop").await?;

    let wrong_password = app
        .send(
            Method::POST,
            "/auth/email",
            None,
            None,
            Some(json!({ "email": "a@x.com", "password": "wrongpass1" })),
        )
        .await?;
    let unknown_account = app
        .send(
            Method::POST,
            "/auth/username",
            None,
            None,
            Some(json!({ "username": "nobody", "password": "secret123" })),
        )
        .await?;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_account.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.json()?, unknown_account.json()?);

    let reply = app
        .send(
            Method::POST,
            "/auth/username",
            None,
            None,
            Some(json!({ "username": "alice", "password": "secret123" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.refresh_cookie().is_some());
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_the_cookie() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.register("alice", "a@x.com", "desktop").await?;
    let token = access_token(&reply)?;
    let first = reply.refresh_cookie().context("missing refresh cookie")?;

    let reply = app
        .send(Method::PATCH, "/refresh", Some(&token), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()?["error"], "missing-refresh-token");

    let reply = app
        .send(Method::PATCH, "/refresh", Some(&token), Some(&first), None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    let second = reply.refresh_cookie().context("missing rotated cookie")?;
    assert_ne!(first, second);
    let rotated = access_token(&reply)?;

    // The previous refresh token is no longer accepted.
    let reply = app
        .send(Method::PATCH, "/refresh", Some(&rotated), Some(&first), None)
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .send(Method::PATCH, "/refresh", Some(&rotated), Some(&second), None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn password_reset_signs_out_everywhere() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.register("alice", "a@x.com", "desktop").await?;
    let token = access_token(&reply)?;
    let account_id = app.account_id(&token)?;

    let reply = app
        .send(
            Method::POST,
            "/password/forgot",
            None,
            None,
            Some(json!({ "email": "nobody@x.com" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .send(
            Method::POST,
            "/password/forgot",
            None,
            None,
            Some(json!({ "email": "a@x.com" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    let reset_token = reply.json()?["token"]
        .as_str()
        .context("missing token")?
        .to_string();

    let reply = app
        .send(
            Method::POST,
            "/password/reset",
            None,
            None,
            Some(json!({
                "accountUUID": account_id,
                "token": reset_token,
                "newPassword": "newsecret456",
            })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);

    // Access token still verifies but the session behind it is gone.
    let reply = app
        .send(Method::GET, "/content", Some(&token), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .send(
            Method::POST,
            "/auth/email",
            None,
            None,
            Some(json!({ "email": "a@x.com", "password": "newsecret456" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn password_update_clears_sessions_and_cookie() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.register("alice", "a@x.com", "desktop").await?;
    let token = access_token(&reply)?;
    let refresh = reply.refresh_cookie().context("missing refresh cookie")?;

    let reply = app
        .send(
            Method::POST,
            "/password/update",
            Some(&token),
            None,
            Some(json!({ "oldPassword": "wrongpass1", "newPassword": "newsecret456" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .send(
            Method::POST,
            "/password/update",
            Some(&token),
            None,
            Some(json!({ "oldPassword": "secret123", "newPassword": "newsecret456" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.refresh_cookie().is_none());

    let reply = app
        .send(Method::PATCH, "/refresh", Some(&token), Some(&refresh), None)
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn email_update_round_trip() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.register("alice", "a@x.com", "desktop").await?;
    let token = access_token(&reply)?;
    let account_id = app.account_id(&token)?;

    let reply = app
        .send(
            Method::POST,
            "/email/update",
            Some(&token),
            None,
            Some(json!({ "newEmail": "a@x.com" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app
        .send(
            Method::POST,
            "/email/update",
            Some(&token),
            None,
            Some(json!({ "newEmail": "new@x.com" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    let change = reply.json()?;
    let confirm = change["token"].as_str().context("missing token")?.to_string();

    let reply = app
        .send(
            Method::POST,
            "/email/update/validate",
            None,
            None,
            Some(json!({ "accountUUID": account_id, "token": confirm })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app
        .send(
            Method::POST,
            "/auth/email",
            None,
            None,
            Some(json!({ "email": "new@x.com", "password": "secret123" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn sessions_can_be_listed_and_revoked() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.register("alice", "a@x.com", "desktop").await?;
    let desktop = access_token(&reply)?;

    let reply = app
        .send(
            Method::POST,
            "/auth/email",
            None,
            None,
            Some(json!({
                "email": "a@x.com",
                "password": "secret123",
                "deviceId": "phone",
                "deviceType": "mobile",
            })),
        )
        .await?;
    let phone = access_token(&reply)?;

    let reply = app
        .send(Method::GET, "/session", Some(&desktop), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    let sessions = reply.json()?["sessions"].clone();
    let sessions = sessions.as_array().context("sessions is not an array")?;
    assert_eq!(sessions.len(), 2);

    let phone_session = sessions
        .iter()
        .find(|session| session["deviceId"] == "phone")
        .and_then(|session| session["sessionId"].as_str())
        .context("phone session missing")?
        .to_string();
    assert!(sessions
        .iter()
        .any(|session| session["deviceId"] == "desktop" && session["current"] == true));

    let reply = app
        .send(
            Method::POST,
            &format!("/session/revoke/{phone_session}"),
            Some(&desktop),
            None,
            None,
        )
        .await?;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = app
        .send(Method::GET, "/content", Some(&phone), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .send(
            Method::POST,
            &format!("/session/revoke/{phone_session}"),
            Some(&desktop),
            None,
            None,
        )
        .await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_current_session() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.register("alice", "a@x.com", "desktop").await?;
    let token = access_token(&reply)?;

    let reply = app
        .send(Method::POST, "/auth/logout", Some(&token), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.refresh_cookie().is_none());

    let reply = app
        .send(Method::GET, "/content", Some(&token), None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn requests_without_bearer_are_unauthorized() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.send(Method::GET, "/content", None, None, None).await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()?["error"], "unauthorized");
    Ok(())
}

#[tokio::test]
async fn health_reports_store_and_request_id() -> Result<()> {
    let app = TestApp::new(false)?;
    let reply = app.send(Method::GET, "/health", None, None, None).await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()?["database"], "ok");
    assert_eq!(reply.json()?["name"], env!("CARGO_PKG_NAME"));
    assert!(reply.headers.contains_key("x-request-id"));
    Ok(())
}
