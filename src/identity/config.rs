//! Immutable identity configuration, built once at startup and injected into
//! the service.

use secrecy::SecretString;

const DEFAULT_ISSUER: &str = "accountd";
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 14 * 24 * 60 * 60;
const DEFAULT_REGISTRATION_CODE_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_CHANGE_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_PASSWORD_MEMORY_KIB: u32 = 19 * 1024;
const DEFAULT_PASSWORD_ITERATIONS: u32 = 2;

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    jwt_secret: SecretString,
    jwt_issuer: String,
    access_token_ttl_seconds: i64,
    session_ttl_seconds: i64,
    registration_code_ttl_seconds: i64,
    change_token_ttl_seconds: i64,
    require_verification: bool,
    password_memory_kib: u32,
    password_iterations: u32,
}

impl IdentityConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            jwt_issuer: DEFAULT_ISSUER.to_string(),
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            registration_code_ttl_seconds: DEFAULT_REGISTRATION_CODE_TTL_SECONDS,
            change_token_ttl_seconds: DEFAULT_CHANGE_TOKEN_TTL_SECONDS,
            require_verification: true,
            password_memory_kib: DEFAULT_PASSWORD_MEMORY_KIB,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_jwt_issuer(mut self, issuer: String) -> Self {
        self.jwt_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_registration_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.registration_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_change_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.change_token_ttl_seconds = seconds;
        self
    }

    /// When disabled, registration skips the verification code and accounts
    /// start out verified.
    #[must_use]
    pub fn with_require_verification(mut self, require: bool) -> Self {
        self.require_verification = require;
        self
    }

    /// Argon2id cost parameters.
    #[must_use]
    pub fn with_password_cost(mut self, memory_kib: u32, iterations: u32) -> Self {
        self.password_memory_kib = memory_kib;
        self.password_iterations = iterations;
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn jwt_issuer(&self) -> &str {
        &self.jwt_issuer
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn registration_code_ttl_seconds(&self) -> i64 {
        self.registration_code_ttl_seconds
    }

    #[must_use]
    pub fn change_token_ttl_seconds(&self) -> i64 {
        self.change_token_ttl_seconds
    }

    #[must_use]
    pub fn require_verification(&self) -> bool {
        self.require_verification
    }

    #[must_use]
    pub fn password_memory_kib(&self) -> u32 {
        self.password_memory_kib
    }

    #[must_use]
    pub fn password_iterations(&self) -> u32 {
        self.password_iterations
    }
}
